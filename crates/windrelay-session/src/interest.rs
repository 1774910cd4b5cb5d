//! Interest cells: a coarse grid over the ground plane.
//!
//! A position maps to the cell containing its `x`/`z` coordinates; height
//! is ignored. Two cells are interested in each other when they are equal
//! or adjacent, including diagonals (Chebyshev distance ≤ 1), giving every
//! player a 3×3 neighbourhood.
//!
//! Cells use floor division, so every cell has the same width on both
//! sides of the origin: `x = -1.0` lands in cell `-1`, not cell `0`.

/// Cell edge length used when none (or an unusable one) is configured.
pub const DEFAULT_CELL_SIZE: f64 = 256.0;

/// Discrete coordinate of one interest cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cell {
    pub x: i64,
    pub z: i64,
}

impl Cell {
    pub const fn new(x: i64, z: i64) -> Self {
        Self { x, z }
    }

    /// `true` if `other` is this cell or one of its eight neighbours.
    ///
    /// Symmetric: `a.is_interested(b) == b.is_interested(a)`.
    pub fn is_interested(self, other: Cell) -> bool {
        self.x.abs_diff(other.x) <= 1 && self.z.abs_diff(other.z) <= 1
    }
}

/// Maps world positions to cells for a fixed cell size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterestGrid {
    cell_size: f64,
}

impl InterestGrid {
    /// Creates a grid. A zero, negative, or non-finite size falls back to
    /// [`DEFAULT_CELL_SIZE`].
    pub fn new(cell_size: f64) -> Self {
        if cell_size.is_finite() && cell_size > 0.0 {
            Self { cell_size }
        } else {
            tracing::warn!(
                cell_size,
                fallback = DEFAULT_CELL_SIZE,
                "unusable interest cell size"
            );
            Self {
                cell_size: DEFAULT_CELL_SIZE,
            }
        }
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// The cell containing `position` (`[x, y, z]`).
    pub fn cell_of(&self, position: &[f64; 3]) -> Cell {
        Cell {
            x: (position[0] / self.cell_size).floor() as i64,
            z: (position[2] / self.cell_size).floor() as i64,
        }
    }
}

impl Default for InterestGrid {
    fn default() -> Self {
        Self {
            cell_size: DEFAULT_CELL_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> InterestGrid {
        InterestGrid::new(256.0)
    }

    #[test]
    fn test_cell_of_ignores_height() {
        assert_eq!(grid().cell_of(&[10.0, 0.0, 10.0]), Cell::new(0, 0));
        assert_eq!(grid().cell_of(&[10.0, 9000.0, 10.0]), Cell::new(0, 0));
    }

    #[test]
    fn test_cell_of_positive_coordinates() {
        assert_eq!(grid().cell_of(&[300.0, 0.0, 0.0]), Cell::new(1, 0));
        assert_eq!(grid().cell_of(&[600.0, 0.0, 0.0]), Cell::new(2, 0));
        assert_eq!(grid().cell_of(&[0.0, 0.0, 511.9]), Cell::new(0, 1));
    }

    #[test]
    fn test_cell_of_boundary_belongs_to_upper_cell() {
        assert_eq!(grid().cell_of(&[256.0, 0.0, 0.0]), Cell::new(1, 0));
        assert_eq!(grid().cell_of(&[255.999, 0.0, 0.0]), Cell::new(0, 0));
    }

    #[test]
    fn test_cell_of_negative_coordinates_floor() {
        assert_eq!(grid().cell_of(&[-1.0, 0.0, -1.0]), Cell::new(-1, -1));
        assert_eq!(grid().cell_of(&[-256.0, 0.0, 0.0]), Cell::new(-1, 0));
        assert_eq!(grid().cell_of(&[-256.5, 0.0, 0.0]), Cell::new(-2, 0));
    }

    #[test]
    fn test_interested_covers_three_by_three() {
        let center = Cell::new(0, 0);
        for dx in -1..=1 {
            for dz in -1..=1 {
                assert!(center.is_interested(Cell::new(dx, dz)), "{dx},{dz}");
            }
        }
        assert!(!center.is_interested(Cell::new(2, 0)));
        assert!(!center.is_interested(Cell::new(0, -2)));
        assert!(!center.is_interested(Cell::new(2, 2)));
    }

    #[test]
    fn test_interested_is_symmetric() {
        let a = Cell::new(-3, 7);
        let b = Cell::new(-2, 8);
        let c = Cell::new(-1, 7);
        assert_eq!(a.is_interested(b), b.is_interested(a));
        assert_eq!(a.is_interested(c), c.is_interested(a));
    }

    #[test]
    fn test_interested_across_origin_uses_floor_cells() {
        // -10 and +10 are 20 units apart and sit in adjacent cells.
        let a = grid().cell_of(&[-10.0, 0.0, 0.0]);
        let b = grid().cell_of(&[10.0, 0.0, 0.0]);
        assert_eq!(a, Cell::new(-1, 0));
        assert!(a.is_interested(b));
    }

    #[test]
    fn test_new_rejects_unusable_cell_size() {
        assert_eq!(InterestGrid::new(0.0).cell_size(), DEFAULT_CELL_SIZE);
        assert_eq!(InterestGrid::new(-5.0).cell_size(), DEFAULT_CELL_SIZE);
        assert_eq!(InterestGrid::new(f64::NAN).cell_size(), DEFAULT_CELL_SIZE);
        assert_eq!(InterestGrid::new(64.0).cell_size(), 64.0);
    }
}
