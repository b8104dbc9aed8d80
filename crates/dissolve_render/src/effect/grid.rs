//! Particle grid derived from a capture.

use crate::capture::Rect;

use super::particle::Particle;

/// `columns x rows` grid of square cells covering a capture.
///
/// Integer division: pixels past the last whole cell are never drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GridSpec {
    columns: u32,
    rows: u32,
    particle_size: u32,
}

impl GridSpec {
    /// Work group edge length of the spawn dispatch.
    pub const WORKGROUP_SIZE: u32 = 8;

    /// Grid over a `width x height` capture. A zero `particle_size` gives an empty grid.
    #[must_use]
    pub const fn new(width: u32, height: u32, particle_size: u32) -> Self {
        if particle_size == 0 {
            return Self {
                columns: 0,
                rows: 0,
                particle_size,
            };
        }
        Self {
            columns: width / particle_size,
            rows: height / particle_size,
            particle_size,
        }
    }

    /// Grid over `rect`.
    #[must_use]
    pub const fn for_rect(rect: &Rect, particle_size: u32) -> Self {
        Self::new(rect.width, rect.height, particle_size)
    }

    /// Grid columns.
    #[must_use]
    pub const fn columns(&self) -> u32 {
        self.columns
    }

    /// Grid rows.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.rows
    }

    /// Cell size in pixels.
    #[must_use]
    pub const fn particle_size(&self) -> u32 {
        self.particle_size
    }

    /// Total particle count.
    #[must_use]
    pub const fn particle_count(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }

    /// True when the grid holds no particles.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.particle_count() == 0
    }

    /// Work groups for the spawn dispatch: `ceil(columns/8) x ceil(rows/8) x 1`.
    #[must_use]
    pub const fn dispatch_size(&self) -> [u32; 3] {
        [
            self.columns.div_ceil(Self::WORKGROUP_SIZE),
            self.rows.div_ceil(Self::WORKGROUP_SIZE),
            1,
        ]
    }

    /// Particle buffer size in bytes.
    #[must_use]
    pub const fn particle_buffer_size(&self) -> u64 {
        self.particle_count() as u64 * Particle::STRIDE
    }

    /// Column-major particle index.
    #[must_use]
    pub const fn particle_index(&self, column: u32, row: u32) -> u32 {
        column.saturating_mul(self.rows).saturating_add(row)
    }

    /// Particles in the leftmost `columns` columns, i.e. the index of the
    /// first particle of column `columns`.
    #[must_use]
    pub const fn particles_in_columns(&self, columns: u32) -> u32 {
        let columns = if columns > self.columns {
            self.columns
        } else {
            columns
        };
        self.particle_index(columns, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Point;

    #[test]
    fn test_floor_division_drops_remainder() {
        let grid = GridSpec::new(45, 31, 10);
        assert_eq!(grid.columns(), 4);
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.particle_count(), 12);
        assert_eq!(grid.particle_buffer_size(), 12 * 48);
    }

    #[test]
    fn test_dispatch_size_rounds_up() {
        assert_eq!(GridSpec::new(40, 30, 10).dispatch_size(), [1, 1, 1]);
        assert_eq!(GridSpec::new(90, 10, 10).dispatch_size(), [2, 1, 1]);
        assert_eq!(GridSpec::new(160, 170, 10).dispatch_size(), [2, 3, 1]);
        assert_eq!(GridSpec::new(1080, 200, 2).dispatch_size(), [68, 13, 1]);
    }

    #[test]
    fn test_dispatch_covers_every_cell() {
        for columns in 1..40 {
            for rows in [1, 7, 8, 9, 33] {
                let grid = GridSpec::new(columns * 3, rows * 3, 3);
                let [x, y, z] = grid.dispatch_size();
                assert!(x * 8 >= columns && (x - 1) * 8 < columns);
                assert!(y * 8 >= rows && (y - 1) * 8 < rows);
                assert_eq!(z, 1);
            }
        }
    }

    #[test]
    fn test_degenerate_grids() {
        assert!(GridSpec::new(9, 100, 10).is_empty());
        assert!(GridSpec::new(100, 100, 0).is_empty());
        let rect = Rect::from_origin(Point::new(3, 4), 0, 0);
        assert!(GridSpec::for_rect(&rect, 2).is_empty());
        assert_eq!(GridSpec::new(0, 0, 2).dispatch_size(), [0, 0, 1]);
    }

    #[test]
    fn test_column_major_index() {
        let grid = GridSpec::new(40, 30, 10);
        assert_eq!(grid.particle_index(0, 0), 0);
        assert_eq!(grid.particle_index(0, 2), 2);
        assert_eq!(grid.particle_index(1, 0), 3);
        assert_eq!(grid.particle_index(3, 2), 11);
        assert_eq!(grid.particles_in_columns(2), 6);
        assert_eq!(grid.particles_in_columns(9), 12);
    }

    #[test]
    fn test_huge_grid_counts_saturate() {
        let grid = GridSpec::new(u32::MAX, u32::MAX, 1);
        assert_eq!(grid.particles_in_columns(u32::MAX), grid.particle_count());
        assert_eq!(grid.particles_in_columns(u32::MAX), u32::MAX);
        assert_eq!(grid.particle_index(2, 5), u32::MAX);
    }
}
