//! Pixel <-> grid cell conversion and snapping.

use kurbo::{Point, Rect};

use crate::entity::GridPos;

/// Default cell size in pixels.
pub const DEFAULT_CELL_SIZE: u32 = 50;

/// The board's coordinate system. Cell size is fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grid {
    cell_size: i64,
}

impl Grid {
    /// Create a grid with the given cell size in pixels.
    ///
    /// A zero cell size is treated as one pixel; configuration validation
    /// rejects zero before it gets here.
    pub fn new(cell_size: u32) -> Self {
        Self {
            cell_size: i64::from(cell_size.max(1)),
        }
    }

    pub fn cell_size(&self) -> i64 {
        self.cell_size
    }

    /// Snap a pixel coordinate to the nearest multiple of the cell size.
    /// Halfway values round away from zero.
    ///
    /// Coordinates beyond the representable range clamp to the outermost
    /// lattice point.
    pub fn snap(&self, pixel: f64) -> i64 {
        let cell = self.cell_size as f64;
        self.clamp_index((pixel / cell).round() as i64) * self.cell_size
    }

    /// Integer snap, exact for the whole `i64` range.
    fn snap_int(&self, value: i64) -> i64 {
        let cell = self.cell_size;
        let (index, rest) = (value.div_euclid(cell), value.rem_euclid(cell));
        // Halfway rounds away from zero
        let up = if value >= 0 { 2 * rest >= cell } else { 2 * rest > cell };
        self.clamp_index(if up { index + 1 } else { index }) * cell
    }

    fn clamp_index(&self, index: i64) -> i64 {
        index.clamp(i64::MIN / self.cell_size, i64::MAX / self.cell_size)
    }

    /// Snap a pointer position on both axes.
    pub fn snap_point(&self, point: Point) -> GridPos {
        GridPos::new(self.snap(point.x), self.snap(point.y))
    }

    /// Re-snap an integer position (e.g. one received from the server).
    pub fn snap_pos(&self, pos: GridPos) -> GridPos {
        if self.is_aligned(pos) {
            return pos;
        }
        GridPos::new(self.snap_int(pos.x), self.snap_int(pos.y))
    }

    /// Index of the cell containing `pixel`.
    pub fn to_cell(&self, pixel: f64) -> i64 {
        (pixel / self.cell_size as f64).floor() as i64
    }

    /// Pixel coordinate of the origin of cell `index`.
    pub fn from_cell(&self, index: i64) -> i64 {
        self.clamp_index(index) * self.cell_size
    }

    /// `(column, row)` of the cell containing `point`.
    pub fn cell_of(&self, point: Point) -> (i64, i64) {
        (self.to_cell(point.x), self.to_cell(point.y))
    }

    /// `(column, row)` of the cell whose origin is `pos`.
    pub fn cell_of_pos(&self, pos: GridPos) -> (i64, i64) {
        (
            pos.x.div_euclid(self.cell_size),
            pos.y.div_euclid(self.cell_size),
        )
    }

    /// Pixel bounds of a cell.
    pub fn cell_rect(&self, col: i64, row: i64) -> Rect {
        let x0 = self.from_cell(col) as f64;
        let y0 = self.from_cell(row) as f64;
        let size = self.cell_size as f64;
        Rect::new(x0, y0, x0 + size, y0 + size)
    }

    /// Whether `pos` lies on the lattice.
    pub fn is_aligned(&self, pos: GridPos) -> bool {
        pos.x.rem_euclid(self.cell_size) == 0 && pos.y.rem_euclid(self.cell_size) == 0
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}
