use crate::grid::coordinate::GridCoordinate;
use crate::grid::spawn::SpawnExclusion;
use crate::persistence::store::ReservationStore;
use crate::telemetry::logging;
use std::collections::{HashSet, VecDeque};

/// FIFO queue of freed plots, consulted before the spiral is extended.
#[derive(Debug, Clone, Default)]
pub struct OrphanPool {
    queue: VecDeque<GridCoordinate>,
    members: HashSet<GridCoordinate>,
}

impl OrphanPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the pool from the store's orphaned records, oldest first.
    /// Orphans that now fall inside the spawn exclusion are left out.
    pub fn from_store(store: &ReservationStore, exclusion: SpawnExclusion) -> Self {
        let mut pool = Self::new();
        for coordinate in store.orphans_in_order() {
            if exclusion.contains(coordinate) {
                logging::log_allocator(&format!(
                    "orphan {} lies inside the spawn exclusion, not reused",
                    coordinate
                ));
                continue;
            }
            pool.put(coordinate);
        }
        pool
    }

    pub fn put(&mut self, coordinate: GridCoordinate) {
        if self.members.insert(coordinate) {
            self.queue.push_back(coordinate);
        }
    }

    pub fn take(&mut self) -> Option<GridCoordinate> {
        let coordinate = self.queue.pop_front()?;
        self.members.remove(&coordinate);
        Some(coordinate)
    }

    /// Puts a taken coordinate back at the head, ahead of everything else.
    pub fn restore_front(&mut self, coordinate: GridCoordinate) {
        if self.members.insert(coordinate) {
            self.queue.push_front(coordinate);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
