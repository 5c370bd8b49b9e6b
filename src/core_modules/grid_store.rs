// THEORY:
// The `GridStore` owns the uniform grid of `CellAccumulator`s for exactly one picture.
// It is the spatial backbone of the engine: every resampling rule addresses cells
// through it, and the reporter reads the finished picture back out of it.
//
// Key architectural principles:
// 1.  **Sized Per Picture**: The grid is allocated from the picture's pixel
//     dimensions when the picture starts (`ceil(width / 16) x ceil(height / 16)`),
//     so memory follows the actual frame instead of a worst-case static array. The
//     fixed `MAX_ROWS` x `MAX_COLS` capacity is still enforced as an input contract.
// 2.  **Checked Addressing**: Cells are only reachable through `CellCoord`s that are
//     validated against the grid; a coordinate outside it is a contract violation,
//     never a silent write into someone else's cell.
// 3.  **Edge Clipping**: `clip` converts a pixel-space unit into the row-major
//     `CellSpan` it covers, dropping the cells that lie beyond the right or bottom
//     picture edge. Both the up-sampling and the group redistribution walk the same
//     clipped span, which is what keeps their bit accounting consistent.

use crate::core_modules::cell::cell::CellAccumulator;
use crate::core_modules::error::{ContractViolation, GridResult, IngestPath};

/// Edge length of one grid cell, in pixels.
pub const GRID_CELL_SIZE: u32 = 16;
/// Maximum number of cell rows a picture may have.
pub const MAX_ROWS: u32 = 1024;
/// Maximum number of cell columns a picture may have.
pub const MAX_COLS: u32 = 1024;
/// Edge length of a coarse group (CTU) in pixels, used to sample group anchors.
pub const GROUP_SIZE: u32 = 64;

/// Row/column address of a cell in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// The cell that contains pixel `(x, y)`.
    pub fn from_pixels(x: u32, y: u32) -> Self {
        Self {
            row: y / GRID_CELL_SIZE,
            col: x / GRID_CELL_SIZE,
        }
    }
}

/// A rectangle of cells, already clipped to the picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    /// Top-left cell of the span.
    pub origin: CellCoord,
    pub rows: u32,
    pub cols: u32,
}

impl CellSpan {
    /// Number of cells in the span.
    pub fn len(&self) -> u32 {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cells of the span in row-major order.
    pub fn coords(self) -> impl Iterator<Item = CellCoord> {
        let CellSpan { origin, rows, cols } = self;
        (0..rows).flat_map(move |r| {
            (0..cols).map(move |c| CellCoord::new(origin.row + r, origin.col + c))
        })
    }
}

/// Dense per-picture grid of cell accumulators.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridStore {
    /// Grid height in cells.
    rows: u32,
    /// Grid width in cells.
    cols: u32,
    /// Row-major cell storage, `rows * cols` long.
    cells: Vec<CellAccumulator>,
}

impl GridStore {
    /// Checks that a `width` x `height` picture fits the grid capacity.
    pub fn validate_dimensions(width: u32, height: u32) -> GridResult<()> {
        let limit_width = GRID_CELL_SIZE * MAX_COLS;
        let limit_height = GRID_CELL_SIZE * MAX_ROWS;
        if width == 0 || height == 0 || width >= limit_width || height >= limit_height {
            return Err(ContractViolation::InvalidDimensions {
                width,
                height,
                limit_width,
                limit_height,
            });
        }
        Ok(())
    }

    /// Allocates a zeroed grid covering a `width` x `height` pixel picture.
    pub fn new(width: u32, height: u32) -> GridResult<Self> {
        Self::validate_dimensions(width, height)?;

        let cols = width.div_ceil(GRID_CELL_SIZE);
        let rows = height.div_ceil(GRID_CELL_SIZE);
        Ok(Self {
            rows,
            cols,
            cells: vec![CellAccumulator::default(); (rows * cols) as usize],
        })
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    fn index_of(&self, coord: CellCoord) -> GridResult<usize> {
        if coord.row >= self.rows || coord.col >= self.cols {
            return Err(ContractViolation::OutOfBounds {
                row: coord.row,
                col: coord.col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok((coord.row * self.cols + coord.col) as usize)
    }

    /// The cell at `coord`, or `None` outside the grid.
    pub fn get(&self, coord: CellCoord) -> Option<&CellAccumulator> {
        self.index_of(coord).ok().map(|i| &self.cells[i])
    }

    pub fn cell(&self, coord: CellCoord) -> GridResult<&CellAccumulator> {
        let i = self.index_of(coord)?;
        Ok(&self.cells[i])
    }

    pub fn cell_mut(&mut self, coord: CellCoord) -> GridResult<&mut CellAccumulator> {
        let i = self.index_of(coord)?;
        Ok(&mut self.cells[i])
    }

    /// Resolves a multi-cell unit anchored at pixel `(x, y)` to the span of cells it
    /// covers inside the picture.
    ///
    /// The anchor must sit on the cell grid and `size` must be a multiple of the cell
    /// size larger than one cell. Only cells that start beyond the picture's
    /// right/bottom edge are excluded; a cell the edge cuts through stays in the span
    /// (its left column satisfies `col * 16 < width`). A unit left with no cells at
    /// all is rejected.
    pub fn clip(&self, path: IngestPath, x: u32, y: u32, size: u32) -> GridResult<CellSpan> {
        if x % GRID_CELL_SIZE != 0 || y % GRID_CELL_SIZE != 0 {
            return Err(ContractViolation::Misaligned {
                path,
                x,
                y,
                cell_size: GRID_CELL_SIZE,
            });
        }
        if size % GRID_CELL_SIZE != 0 || size <= GRID_CELL_SIZE {
            return Err(ContractViolation::InvalidSize { path, size });
        }

        let n = size / GRID_CELL_SIZE;
        let origin = CellCoord::from_pixels(x, y);
        let span = CellSpan {
            origin,
            rows: n.min(self.rows.saturating_sub(origin.row)),
            cols: n.min(self.cols.saturating_sub(origin.col)),
        };
        if span.is_empty() {
            return Err(ContractViolation::EmptySpan { path, x, y, size });
        }
        Ok(span)
    }

    /// All cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (CellCoord, &CellAccumulator)> {
        let cols = self.cols.max(1);
        self.cells
            .iter()
            .enumerate()
            .map(move |(i, cell)| (CellCoord::new(i as u32 / cols, i as u32 % cols), cell))
    }

    /// Sum of `bits` over the cells of `span`.
    pub fn span_bits(&self, span: CellSpan) -> u64 {
        span.coords()
            .filter_map(|coord| self.get(coord))
            .map(|cell| cell.bits)
            .sum()
    }

    /// Sum of `bits` over the whole grid.
    pub fn total_bits(&self) -> u64 {
        self.cells.iter().map(|cell| cell.bits).sum()
    }
}
