/// A plot location in world-block units. Plots sit on a lattice whose step is
/// the configured island spacing; equality and hashing are by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoordinate {
    pub x: i32,
    pub z: i32,
}

impl GridCoordinate {
    pub const ORIGIN: GridCoordinate = GridCoordinate { x: 0, z: 0 };

    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// `max(|dx|, |dz|)` in blocks.
    pub fn chebyshev_distance(self, other: GridCoordinate) -> u32 {
        let dx = (i64::from(self.x) - i64::from(other.x)).unsigned_abs();
        let dz = (i64::from(self.z) - i64::from(other.z)).unsigned_abs();
        dx.max(dz) as u32
    }

    /// Floors the coordinate onto the lattice and returns lattice indices.
    pub fn to_lattice(self, spacing: i32) -> (i32, i32) {
        let spacing = spacing.max(1);
        (self.x.div_euclid(spacing), self.z.div_euclid(spacing))
    }

    pub fn from_lattice(x: i32, z: i32, spacing: i32) -> Self {
        let spacing = spacing.max(1);
        Self {
            x: x.saturating_mul(spacing),
            z: z.saturating_mul(spacing),
        }
    }
}

impl std::fmt::Display for GridCoordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}
