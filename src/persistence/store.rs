use crate::allocator::error::AllocatorError;
use crate::grid::coordinate::GridCoordinate;
use crate::persistence::log_entry::{now_millis, AllocationLogEntry, TransitionKind};
use crate::persistence::medium::LogMedium;
use crate::telemetry::logging;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationState {
    Assigned,
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub coordinate: GridCoordinate,
    pub owner: Option<String>,
    pub state: ReservationState,
    pub last_changed_at: u64,
    /// Position of the superseding log entry; orders orphans for the pool.
    revision: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub assigned: usize,
    pub orphaned: usize,
    pub corrupt_entries: usize,
    pub applied_entries: u64,
}

/// Durable coordinate -> reservation map plus the spiral cursor. All state is
/// rebuilt by replaying the append-only log; in-memory state only changes
/// after the medium has acknowledged a write.
pub struct ReservationStore {
    medium: Box<dyn LogMedium>,
    reservations: HashMap<GridCoordinate, Reservation>,
    cursor: GridCoordinate,
    corrupt_entries: usize,
    next_revision: u64,
}

impl ReservationStore {
    pub fn load(medium: Box<dyn LogMedium>) -> Result<Self, AllocatorError> {
        let mut medium = medium;
        let location = medium.location();
        let lines = medium
            .read_lines()
            .map_err(|msg| AllocatorError::StorageIo(location.clone(), msg))?;
        let mut store = ReservationStore {
            medium,
            reservations: HashMap::new(),
            cursor: GridCoordinate::ORIGIN,
            corrupt_entries: 0,
            next_revision: 0,
        };
        for (index, line) in lines.iter().enumerate() {
            let line_no = index + 1;
            let entry = match AllocationLogEntry::parse_line(line, line_no) {
                Ok(entry) => entry,
                Err(err) => {
                    store.corrupt_entries += 1;
                    logging::log_error(&format!("{}: skipped {}", location.display(), err));
                    continue;
                }
            };
            if let Err(reason) = store.apply(&entry) {
                store.corrupt_entries += 1;
                logging::log_error(&format!(
                    "{}: skipped line {}: {}",
                    location.display(),
                    line_no,
                    reason
                ));
            }
        }
        if store.corrupt_entries > 0 {
            eprintln!(
                "skyplot: reservation log {} had {} unreadable entries",
                location.display(),
                store.corrupt_entries
            );
        }
        Ok(store)
    }

    pub fn is_assigned(&self, coordinate: GridCoordinate) -> bool {
        matches!(
            self.reservations.get(&coordinate).map(|r| r.state),
            Some(ReservationState::Assigned)
        )
    }

    pub fn reservation(&self, coordinate: GridCoordinate) -> Option<&Reservation> {
        self.reservations.get(&coordinate)
    }

    pub fn cursor(&self) -> GridCoordinate {
        self.cursor
    }

    pub fn corrupt_entries(&self) -> usize {
        self.corrupt_entries
    }

    pub fn append(&mut self, entry: AllocationLogEntry) -> Result<(), AllocatorError> {
        self.append_all(&[entry])
    }

    /// Writes all entries with one durable append, then applies them. If the
    /// write fails nothing is applied.
    pub fn append_all(&mut self, entries: &[AllocationLogEntry]) -> Result<(), AllocatorError> {
        let mut staged = self.reservations_snapshot_for(entries);
        for entry in entries {
            check_transition(&staged, entry)?;
            stage(&mut staged, entry);
        }
        let lines: Vec<String> = entries.iter().map(AllocationLogEntry::to_line).collect();
        self.medium
            .append_lines(&lines)
            .map_err(|msg| AllocatorError::StorageIo(self.medium.location(), msg))?;
        for entry in entries {
            // checked above against the same state
            let _ = self.apply(entry);
        }
        Ok(())
    }

    pub fn assign(
        &mut self,
        coordinate: GridCoordinate,
        owner: Option<String>,
        timestamp_ms: u64,
    ) -> Result<(), AllocatorError> {
        self.append(AllocationLogEntry::assign(coordinate, owner, timestamp_ms))
    }

    /// Returns `Ok(false)` without writing when `coordinate` is not assigned.
    pub fn mark_orphan(
        &mut self,
        coordinate: GridCoordinate,
        timestamp_ms: u64,
    ) -> Result<bool, AllocatorError> {
        if !self.is_assigned(coordinate) {
            return Ok(false);
        }
        self.append(AllocationLogEntry::orphan(coordinate, timestamp_ms))?;
        Ok(true)
    }

    pub fn advance_cursor(
        &mut self,
        new_cursor: GridCoordinate,
        timestamp_ms: u64,
    ) -> Result<(), AllocatorError> {
        self.append(AllocationLogEntry::cursor_advance(new_cursor, timestamp_ms))
    }

    /// Orphaned coordinates, oldest orphan first.
    pub fn orphans_in_order(&self) -> Vec<GridCoordinate> {
        let mut orphans: Vec<&Reservation> = self
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Orphaned)
            .collect();
        orphans.sort_by_key(|r| r.revision);
        orphans.into_iter().map(|r| r.coordinate).collect()
    }

    pub fn stats(&self) -> StoreStats {
        let assigned = self
            .reservations
            .values()
            .filter(|r| r.state == ReservationState::Assigned)
            .count();
        StoreStats {
            assigned,
            orphaned: self.reservations.len() - assigned,
            corrupt_entries: self.corrupt_entries,
            applied_entries: self.next_revision,
        }
    }

    /// Rewrites the log as the shortest history that replays to the current
    /// state: one ASSIGN per reservation, ORPHAN lines in orphan order, and a
    /// final cursor line.
    pub fn compact(&mut self) -> Result<usize, AllocatorError> {
        let mut ordered: Vec<&Reservation> = self.reservations.values().collect();
        ordered.sort_by_key(|r| r.revision);
        let mut entries = Vec::with_capacity(ordered.len() + 1);
        for reservation in &ordered {
            entries.push(AllocationLogEntry::assign(
                reservation.coordinate,
                reservation.owner.clone(),
                reservation.last_changed_at,
            ));
        }
        for reservation in &ordered {
            if reservation.state == ReservationState::Orphaned {
                entries.push(AllocationLogEntry::orphan(
                    reservation.coordinate,
                    reservation.last_changed_at,
                ));
            }
        }
        if self.cursor != GridCoordinate::ORIGIN {
            entries.push(AllocationLogEntry::cursor_advance(
                self.cursor,
                now_millis(),
            ));
        }
        let lines: Vec<String> = entries.iter().map(AllocationLogEntry::to_line).collect();
        self.medium
            .rewrite(&lines)
            .map_err(|msg| AllocatorError::StorageIo(self.medium.location(), msg))?;

        // Revisions restart from the compacted history.
        self.reservations.clear();
        self.next_revision = 0;
        self.corrupt_entries = 0;
        for entry in &entries {
            let _ = self.apply(entry);
        }
        Ok(lines.len())
    }

    fn reservations_snapshot_for(
        &self,
        entries: &[AllocationLogEntry],
    ) -> HashMap<GridCoordinate, ReservationState> {
        entries
            .iter()
            .filter_map(|entry| {
                self.reservations
                    .get(&entry.coordinate)
                    .map(|r| (entry.coordinate, r.state))
            })
            .collect()
    }

    fn apply(&mut self, entry: &AllocationLogEntry) -> Result<(), String> {
        let revision = self.next_revision;
        match entry.kind {
            TransitionKind::Assign => {
                // First owner wins: a second ASSIGN without an ORPHAN in
                // between is never produced by append_all.
                if let Some(current) = self.reservations.get(&entry.coordinate) {
                    if current.state == ReservationState::Assigned {
                        return Err(format!(
                            "assign of already assigned plot {} (held by {})",
                            entry.coordinate,
                            current.owner.as_deref().unwrap_or("-")
                        ));
                    }
                }
                self.reservations.insert(
                    entry.coordinate,
                    Reservation {
                        coordinate: entry.coordinate,
                        owner: entry.owner.clone(),
                        state: ReservationState::Assigned,
                        last_changed_at: entry.timestamp_ms,
                        revision,
                    },
                );
            }
            TransitionKind::Orphan => {
                let Some(reservation) = self.reservations.get_mut(&entry.coordinate) else {
                    return Err(format!("orphan of unknown plot {}", entry.coordinate));
                };
                if reservation.state != ReservationState::Assigned {
                    return Err(format!("orphan of unassigned plot {}", entry.coordinate));
                }
                reservation.state = ReservationState::Orphaned;
                reservation.owner = None;
                reservation.last_changed_at = entry.timestamp_ms;
                reservation.revision = revision;
            }
            TransitionKind::CursorAdvance => {
                self.cursor = entry.coordinate;
            }
        }
        self.next_revision += 1;
        Ok(())
    }
}

fn check_transition(
    staged: &HashMap<GridCoordinate, ReservationState>,
    entry: &AllocationLogEntry,
) -> Result<(), AllocatorError> {
    let current = staged.get(&entry.coordinate).copied();
    let allowed = match entry.kind {
        TransitionKind::Assign => current != Some(ReservationState::Assigned),
        TransitionKind::Orphan => current == Some(ReservationState::Assigned),
        TransitionKind::CursorAdvance => true,
    };
    if allowed {
        Ok(())
    } else {
        Err(AllocatorError::InvalidTransition(format!(
            "refusing {} for plot {} in state {:?}",
            entry.kind.as_str(),
            entry.coordinate,
            current
        )))
    }
}

fn stage(staged: &mut HashMap<GridCoordinate, ReservationState>, entry: &AllocationLogEntry) {
    match entry.kind {
        TransitionKind::Assign => {
            staged.insert(entry.coordinate, ReservationState::Assigned);
        }
        TransitionKind::Orphan => {
            staged.insert(entry.coordinate, ReservationState::Orphaned);
        }
        TransitionKind::CursorAdvance => {}
    }
}
