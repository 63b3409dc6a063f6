use crate::grid::coordinate::GridCoordinate;

/// Square region around the spawn origin that never receives a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnExclusion {
    /// Chebyshev radius in blocks; a coordinate at or within it is excluded.
    pub radius: u32,
}

impl SpawnExclusion {
    pub fn new(radius: u32) -> Self {
        SpawnExclusion { radius }
    }

    /// Check if a coordinate falls inside the excluded square.
    pub fn contains(&self, coordinate: GridCoordinate) -> bool {
        coordinate.chebyshev_distance(GridCoordinate::ORIGIN) <= self.radius
    }

    /// Number of lattice rings swallowed by the region.
    pub fn rings(&self, spacing: i32) -> u32 {
        self.radius / spacing.max(1) as u32
    }
}
