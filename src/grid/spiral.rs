//! Outward square spiral over the plot lattice.
//!
//! Ring `r` (lattice units, `r >= 1`) holds the `8r` cells at Chebyshev
//! distance `r` from the origin. A ring is walked as:
//!
//! * east edge, from `(r, -r + 1)` towards +z down to `(r, r)`,
//! * south edge, towards -x to `(-r, r)`,
//! * west edge, towards -z to `(-r, -r)`,
//! * north edge, towards +x, closing on the corner `(r, -r)`.
//!
//! Ring transition: from the closing corner `(r, -r)` the walk steps one cell
//! towards +x onto `(r + 1, -r)`, which is the first cell of ring `r + 1`.
//! The origin is ring 0 and is followed by `(1, 0)`. Every step, ring
//! transitions included, is exactly one spacing long.

use crate::grid::coordinate::GridCoordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiralSequencer {
    spacing: i32,
}

impl SpiralSequencer {
    pub fn new(spacing: i32) -> Self {
        Self {
            spacing: spacing.max(1),
        }
    }

    pub fn spacing(&self) -> i32 {
        self.spacing
    }

    /// Next coordinate after `current` along the spiral. Off-lattice input is
    /// floored onto the lattice first. At the edge of the `i32` range, where
    /// there is no next cell, `current` is returned unchanged.
    pub fn next_after(&self, current: GridCoordinate) -> GridCoordinate {
        self.checked_next_after(current).unwrap_or(current)
    }

    /// As `next_after`, but `None` once the next cell is not representable.
    pub fn checked_next_after(&self, current: GridCoordinate) -> Option<GridCoordinate> {
        let (x, z) = current.to_lattice(self.spacing);
        let (nx, nz) = step_lattice(i64::from(x), i64::from(z));
        let spacing = i64::from(self.spacing);
        let x = i32::try_from(nx.checked_mul(spacing)?).ok()?;
        let z = i32::try_from(nz.checked_mul(spacing)?).ok()?;
        Some(GridCoordinate::new(x, z))
    }

    /// Chebyshev ring index of `coordinate` in lattice units.
    pub fn ring_of(&self, coordinate: GridCoordinate) -> u32 {
        let (x, z) = coordinate.to_lattice(self.spacing);
        x.unsigned_abs().max(z.unsigned_abs())
    }

    /// Last cell the walk visits on `ring`: its north-east corner.
    pub fn ring_end(&self, ring: u32) -> GridCoordinate {
        let r = ring.min(i32::MAX as u32) as i32;
        GridCoordinate::from_lattice(r, -r, self.spacing)
    }

    /// All cells of `ring`, in the order `next_after` visits them.
    pub fn ring_coordinates(&self, ring: u32) -> Vec<GridCoordinate> {
        if ring == 0 {
            return vec![GridCoordinate::ORIGIN];
        }
        let r = ring as i32;
        let mut cells = Vec::with_capacity(8 * ring as usize);
        for z in (-r + 1)..=r {
            cells.push((r, z));
        }
        for x in (-r..r).rev() {
            cells.push((x, r));
        }
        for z in (-r..r).rev() {
            cells.push((-r, z));
        }
        for x in (-r + 1)..=r {
            cells.push((x, -r));
        }
        cells
            .into_iter()
            .map(|(x, z)| GridCoordinate::from_lattice(x, z, self.spacing))
            .collect()
    }
}

// Wide enough that rings past the `i32` range never overflow.
fn step_lattice(x: i64, z: i64) -> (i64, i64) {
    let r = x.abs().max(z.abs());
    if r == 0 {
        return (1, 0);
    }
    if x == r && z == -r {
        // closing corner: hop into the next ring
        return (r + 1, -r);
    }
    if x == r && z < r {
        (x, z + 1)
    } else if z == r && x > -r {
        (x - 1, z)
    } else if x == -r && z > -r {
        (x, z - 1)
    } else {
        (x + 1, z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn next_after_is_deterministic() {
        let spiral = SpiralSequencer::new(10);
        let mut current = GridCoordinate::ORIGIN;
        for _ in 0..200 {
            let next = spiral.next_after(current);
            assert_eq!(spiral.next_after(current), next);
            current = next;
        }
    }

    #[test]
    fn first_ring_matches_concrete_walk() {
        let spiral = SpiralSequencer::new(10);
        let mut current = GridCoordinate::ORIGIN;
        let mut seen = Vec::new();
        for _ in 0..8 {
            let next = spiral.next_after(current);
            assert_eq!(next.chebyshev_distance(GridCoordinate::ORIGIN), 10);
            let dx = (next.x - current.x).abs();
            let dz = (next.z - current.z).abs();
            if !seen.is_empty() {
                assert_eq!(dx + dz, 10, "{} -> {}", current, next);
            }
            seen.push(next);
            current = next;
        }
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(unique.len(), 8);
        assert_eq!(
            seen,
            vec![
                GridCoordinate::new(10, 0),
                GridCoordinate::new(10, 10),
                GridCoordinate::new(0, 10),
                GridCoordinate::new(-10, 10),
                GridCoordinate::new(-10, 0),
                GridCoordinate::new(-10, -10),
                GridCoordinate::new(0, -10),
                GridCoordinate::new(10, -10),
            ]
        );
    }

    #[test]
    fn walk_never_repeats_and_never_moves_inward() {
        let spiral = SpiralSequencer::new(7);
        let mut current = GridCoordinate::ORIGIN;
        let mut seen = HashSet::new();
        let mut last_ring = 0;
        for _ in 0..5_000 {
            let next = spiral.next_after(current);
            let ring = spiral.ring_of(next);
            assert!(ring >= last_ring);
            assert!(seen.insert(next), "repeated {}", next);
            last_ring = ring;
            current = next;
        }
    }

    #[test]
    fn walk_covers_every_cell_of_each_ring() {
        let spiral = SpiralSequencer::new(1);
        let mut current = GridCoordinate::ORIGIN;
        for ring in 1..=12u32 {
            let expected = spiral.ring_coordinates(ring);
            assert_eq!(expected.len(), 8 * ring as usize);
            for cell in expected {
                current = spiral.next_after(current);
                assert_eq!(current, cell);
            }
        }
    }

    #[test]
    fn ring_transition_steps_one_cell_east() {
        let spiral = SpiralSequencer::new(10);
        let last = *spiral.ring_coordinates(2).last().expect("ring 2");
        assert_eq!(last, GridCoordinate::new(20, -20));
        assert_eq!(spiral.ring_end(2), last);
        assert_eq!(spiral.next_after(last), GridCoordinate::new(30, -20));
        assert_eq!(spiral.ring_coordinates(3)[0], GridCoordinate::new(30, -20));
    }

    #[test]
    fn off_lattice_input_is_floored() {
        let spiral = SpiralSequencer::new(10);
        assert_eq!(
            spiral.next_after(GridCoordinate::new(13, 4)),
            spiral.next_after(GridCoordinate::new(10, 0))
        );
    }

    #[test]
    fn extreme_cursors_step_without_overflow() {
        let spiral = SpiralSequencer::new(1);
        assert_eq!(
            spiral.checked_next_after(GridCoordinate::new(i32::MIN, 0)),
            Some(GridCoordinate::new(i32::MIN, -1))
        );
        assert_eq!(
            spiral.checked_next_after(GridCoordinate::new(i32::MIN, i32::MIN)),
            Some(GridCoordinate::new(i32::MIN + 1, i32::MIN))
        );
        let corner = GridCoordinate::new(i32::MAX, -i32::MAX);
        assert_eq!(spiral.checked_next_after(corner), None);
        assert_eq!(spiral.next_after(corner), corner);

        let wide = SpiralSequencer::new(10);
        let edge = GridCoordinate::new(i32::MIN, 0);
        assert_eq!(wide.checked_next_after(edge), None);
        assert_eq!(wide.ring_of(edge), 214_748_365);
    }

    #[test]
    fn ring_zero_is_origin() {
        let spiral = SpiralSequencer::new(50);
        assert_eq!(spiral.ring_coordinates(0), vec![GridCoordinate::ORIGIN]);
        assert_eq!(spiral.ring_of(GridCoordinate::ORIGIN), 0);
    }
}
