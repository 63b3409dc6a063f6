use crate::allocator::error::AllocatorError;
use crate::config::{AllocatorConfig, AllocatorSettings};
use crate::grid::coordinate::GridCoordinate;
use crate::grid::spiral::SpiralSequencer;
use crate::persistence::log_entry::{now_millis, AllocationLogEntry};
use crate::persistence::medium::{FileLog, LogMedium};
use crate::persistence::orphans::OrphanPool;
use crate::persistence::store::{ReservationStore, StoreStats};
use crate::telemetry::logging;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    pub store: StoreStats,
    pub pooled_orphans: usize,
    pub cursor: GridCoordinate,
}

struct AllocatorState {
    store: ReservationStore,
    orphans: OrphanPool,
}

/// The one owner of reservation state. Every public method holds the same
/// mutex for its whole body, so the read-check-write sequence of `allocate`
/// and `release` never interleaves with another caller.
///
/// `allocate` blocks on the lock and on a synced disk write; call it from a
/// worker thread, not from a tick loop.
pub struct AllocationService {
    settings: AllocatorSettings,
    spiral: SpiralSequencer,
    state: Mutex<AllocatorState>,
}

impl AllocationService {
    /// Validates `config` and replays `<storage_dir>/reservations.log`.
    pub fn open(config: &AllocatorConfig) -> Result<Self, AllocatorError> {
        let settings = config.validate()?;
        let medium = FileLog::open(&settings.storage_dir)
            .map_err(|msg| AllocatorError::StorageIo(settings.storage_dir.clone(), msg))?;
        Self::with_medium(settings, Box::new(medium))
    }

    pub fn with_medium(
        settings: AllocatorSettings,
        medium: Box<dyn LogMedium>,
    ) -> Result<Self, AllocatorError> {
        let store = ReservationStore::load(medium)?;
        let orphans = OrphanPool::from_store(&store, settings.exclusion);
        let stats = store.stats();
        logging::log_allocator(&format!(
            "loaded reservations: assigned={}, orphaned={}, pooled={}, corrupt={}, cursor={}",
            stats.assigned,
            stats.orphaned,
            orphans.len(),
            stats.corrupt_entries,
            store.cursor()
        ));
        Ok(AllocationService {
            spiral: SpiralSequencer::new(settings.spacing),
            settings,
            state: Mutex::new(AllocatorState { store, orphans }),
        })
    }

    pub fn settings(&self) -> &AllocatorSettings {
        &self.settings
    }

    /// Hands out a plot: the oldest orphan if any, otherwise the next free
    /// spiral cell. The reservation is on disk before this returns `Ok`.
    pub fn allocate(&self, owner: &str) -> Result<GridCoordinate, AllocatorError> {
        let mut state = self.lock()?;
        let now = now_millis();
        let owner = (!owner.is_empty()).then(|| owner.to_string());

        while let Some(orphan) = state.orphans.take() {
            if state.store.is_assigned(orphan) || self.settings.exclusion.contains(orphan) {
                continue;
            }
            if let Err(err) = state.store.assign(orphan, owner.clone(), now) {
                state.orphans.restore_front(orphan);
                logging::log_error(&format!("reuse of orphan {} failed: {}", orphan, err));
                return Err(err);
            }
            logging::log_allocator(&format!(
                "assigned orphan {} to {}",
                orphan,
                owner.as_deref().unwrap_or("-")
            ));
            return Ok(orphan);
        }

        let candidate = match self.next_candidate(&state.store) {
            Ok(candidate) => candidate,
            Err(err) => {
                logging::log_error(&format!(
                    "no plot left for {}: {}",
                    owner.as_deref().unwrap_or("-"),
                    err
                ));
                return Err(err);
            }
        };
        let entries = [
            AllocationLogEntry::assign(candidate, owner.clone(), now),
            AllocationLogEntry::cursor_advance(candidate, now),
        ];
        // On failure the store is untouched, so the cursor still sits before
        // `candidate` and the next call retries it.
        if let Err(err) = state.store.append_all(&entries) {
            logging::log_error(&format!("allocation of {} failed: {}", candidate, err));
            return Err(err);
        }
        logging::log_allocator(&format!(
            "assigned {} to {}",
            candidate,
            owner.as_deref().unwrap_or("-")
        ));
        Ok(candidate)
    }

    /// Frees an assigned plot for reuse. `Ok(false)` when it was not assigned.
    pub fn release(&self, coordinate: GridCoordinate) -> Result<bool, AllocatorError> {
        let mut state = self.lock()?;
        let released = match state.store.mark_orphan(coordinate, now_millis()) {
            Ok(released) => released,
            Err(err) => {
                logging::log_error(&format!("release of {} failed: {}", coordinate, err));
                return Err(err);
            }
        };
        if !released {
            return Ok(false);
        }
        if !self.settings.exclusion.contains(coordinate) {
            state.orphans.put(coordinate);
        }
        logging::log_allocator(&format!("released {}", coordinate));
        Ok(true)
    }

    pub fn owner_of(&self, coordinate: GridCoordinate) -> Result<Option<String>, AllocatorError> {
        let state = self.lock()?;
        Ok(state
            .store
            .reservation(coordinate)
            .filter(|_| state.store.is_assigned(coordinate))
            .and_then(|reservation| reservation.owner.clone()))
    }

    pub fn is_assigned(&self, coordinate: GridCoordinate) -> Result<bool, AllocatorError> {
        Ok(self.lock()?.store.is_assigned(coordinate))
    }

    pub fn stats(&self) -> Result<AllocatorStats, AllocatorError> {
        let state = self.lock()?;
        Ok(AllocatorStats {
            store: state.store.stats(),
            pooled_orphans: state.orphans.len(),
            cursor: state.store.cursor(),
        })
    }

    /// Rewrites the reservation log as a snapshot. Returns the line count.
    pub fn compact(&self) -> Result<usize, AllocatorError> {
        let mut state = self.lock()?;
        let lines = state.store.compact()?;
        logging::log_allocator(&format!("compacted reservation log to {} lines", lines));
        Ok(lines)
    }

    fn lock(&self) -> Result<MutexGuard<'_, AllocatorState>, AllocatorError> {
        self.state.lock().map_err(|_| AllocatorError::Poisoned)
    }

    fn next_candidate(&self, store: &ReservationStore) -> Result<GridCoordinate, AllocatorError> {
        let excluded_rings = self.settings.exclusion.rings(self.spiral.spacing());
        let mut cursor = store.cursor();
        if self.spiral.ring_of(cursor) <= excluded_rings {
            // Jump over the whole exclusion: the last cell of the last
            // excluded ring is followed by the first usable one.
            cursor = self.spiral.ring_end(excluded_rings);
        }
        loop {
            let Some(candidate) = self.spiral.checked_next_after(cursor) else {
                return Err(AllocatorError::ExhaustedConfiguration(format!(
                    "spiral cursor {} is at the edge of the coordinate range",
                    cursor
                )));
            };
            if !self.settings.exclusion.contains(candidate) && !store.is_assigned(candidate) {
                return Ok(candidate);
            }
            cursor = candidate;
        }
    }
}
