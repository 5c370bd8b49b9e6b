// THEORY:
// The `resampler` is the algorithmic core of the engine. It re-expresses decoder
// measurements reported on a quadtree (8x8 up to 64x64 units) on the uniform 16x16
// grid without creating or losing a single bit.
//
// Key architectural principles & algorithm steps:
// 1.  **Dispatch by Size**: `ingest_unit` compares the unit size with the cell size
//     and routes the report to one of three rules. Group reports never go through
//     this comparison; they always take the overhead path.
// 2.  **Native**: A 16x16 unit maps onto exactly one cell and overwrites it.
// 3.  **Down-sample**: Several sub-units fold into one cell. Bits sum; quality is a
//     running mean weighted by the number of contributions so far.
// 4.  **Up-sample**: A super-unit is spread over the clipped span of cells it covers.
//     Every cell gets `bits / blocks`; the `bits % blocks` remainder is handed out one
//     bit per cell in row-major order, so the span sums back to the unit's bits.
// 5.  **Group Overhead**: A group's total is larger than what its children reported
//     (headers, signalling). The difference is spread over the group's span in two
//     passes: an even share per cell, then the remainder one bit at a time in
//     row-major order. The exact per-cell placement is part of the output contract.
// 6.  **Stateless Utility**: These are free functions over a borrowed `GridStore`
//     and `Extent`. They own no state.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::trace;

use crate::core_modules::error::{ContractViolation, GridResult, IngestPath};
use crate::core_modules::grid_store::{CellCoord, GRID_CELL_SIZE, GridStore};

/// One decoder measurement for a coding unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Left edge of the unit, in pixels.
    pub x: u32,
    /// Top edge of the unit, in pixels.
    pub y: u32,
    /// Edge length of the (square) unit, in pixels.
    pub size: u32,
    /// Bits the decoder attributed to the unit.
    pub bits: u64,
    /// Quality (QP) the unit was coded with.
    pub quality: f64,
}

/// One decoder measurement for a coarse group (CTU), including its overhead bits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    /// Identifier of the group within the picture.
    pub index: u32,
    pub x: u32,
    pub y: u32,
    pub size: u32,
    /// Overhead-inclusive bit total of the group.
    pub bits: u64,
    pub quality: f64,
}

/// Largest occupied row and column seen in the current picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub max_row: u32,
    pub max_col: u32,
}

impl Extent {
    /// Grows the extent to include `coord`.
    pub fn include(&mut self, coord: CellCoord) {
        self.max_row = self.max_row.max(coord.row);
        self.max_col = self.max_col.max(coord.col);
    }

    /// Number of cell columns spanned, i.e. the stride of a row in reports.
    pub fn width(&self) -> u32 {
        self.max_col + 1
    }

    pub fn height(&self) -> u32 {
        self.max_row + 1
    }
}

/// How a group's overhead was spread over its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverheadSplit {
    /// Cells in the clipped group span.
    pub blocks: u32,
    /// Bits the group carried beyond what its children reported.
    pub overhead: u64,
    /// Even share added to every cell in the first pass.
    pub per_cell: u64,
    /// Cells that received one extra bit in the second pass.
    pub leftover: u64,
}

/// Routes a unit report by comparing its size with the cell size.
pub fn ingest_unit(grid: &mut GridStore, extent: &mut Extent, unit: &UnitReport) -> GridResult<()> {
    match unit.size.cmp(&GRID_CELL_SIZE) {
        Ordering::Less => ingest_subunit(grid, extent, unit),
        Ordering::Equal => ingest_native(grid, extent, unit),
        Ordering::Greater => ingest_superunit(grid, extent, unit).map(|_| ()),
    }
}

/// Records a unit that exactly matches one cell. Last write wins.
pub fn ingest_native(
    grid: &mut GridStore,
    extent: &mut Extent,
    unit: &UnitReport,
) -> GridResult<()> {
    if unit.size != GRID_CELL_SIZE {
        return Err(ContractViolation::InvalidSize {
            path: IngestPath::Native,
            size: unit.size,
        });
    }
    if unit.x % GRID_CELL_SIZE != 0 || unit.y % GRID_CELL_SIZE != 0 {
        return Err(ContractViolation::Misaligned {
            path: IngestPath::Native,
            x: unit.x,
            y: unit.y,
            cell_size: GRID_CELL_SIZE,
        });
    }

    let coord = CellCoord::from_pixels(unit.x, unit.y);
    grid.cell_mut(coord)?.assign_native(unit.bits, unit.quality);
    extent.include(coord);
    trace!(row = coord.row, col = coord.col, bits = unit.bits, "native unit");
    Ok(())
}

/// Folds a unit smaller than a cell into the cell that encloses its anchor.
pub fn ingest_subunit(
    grid: &mut GridStore,
    extent: &mut Extent,
    unit: &UnitReport,
) -> GridResult<()> {
    if unit.size == 0 || unit.size >= GRID_CELL_SIZE {
        return Err(ContractViolation::InvalidSize {
            path: IngestPath::SubUnit,
            size: unit.size,
        });
    }

    let coord = CellCoord::from_pixels(unit.x, unit.y);
    grid.cell_mut(coord)?.accumulate_subunit(unit.bits, unit.quality);
    extent.include(coord);
    trace!(row = coord.row, col = coord.col, bits = unit.bits, size = unit.size, "sub-unit");
    Ok(())
}

/// Spreads a unit larger than a cell over the cells it covers inside the picture.
///
/// Returns the number of cells the unit was spread over.
pub fn ingest_superunit(
    grid: &mut GridStore,
    extent: &mut Extent,
    unit: &UnitReport,
) -> GridResult<u32> {
    let span = grid.clip(IngestPath::SuperUnit, unit.x, unit.y, unit.size)?;
    let blocks = span.len();
    let share = unit.bits / u64::from(blocks);
    let mut extra = unit.bits % u64::from(blocks);

    for coord in span.coords() {
        let mut bits = share;
        if extra > 0 {
            bits += 1;
            extra -= 1;
        }
        grid.cell_mut(coord)?.assign_share(bits, unit.bits, unit.quality, blocks);
        extent.include(coord);
    }

    trace!(
        row = span.origin.row,
        col = span.origin.col,
        bits = unit.bits,
        blocks,
        "super-unit"
    );
    Ok(blocks)
}

/// Tags every cell of a group's span with the group and spreads the group's
/// overhead bits over them.
///
/// Must run after every unit of the group has been ingested: the overhead is the
/// group total minus the bits its cells already hold. Afterwards the span sums to
/// exactly `group.bits`.
pub fn ingest_group(grid: &mut GridStore, group: &GroupReport) -> GridResult<OverheadSplit> {
    let span = grid.clip(IngestPath::Group, group.x, group.y, group.size)?;
    let blocks = u64::from(span.len());

    let child_bits = grid.span_bits(span);
    if child_bits > group.bits {
        return Err(ContractViolation::NegativeOverhead {
            group_index: group.index,
            total_bits: group.bits,
            child_bits,
        });
    }

    for coord in span.coords() {
        grid.cell_mut(coord)?.tag_group(group.index, group.bits);
    }

    let overhead = group.bits - child_bits;
    let mut remaining = overhead;

    // Even share first.
    let per_cell = remaining / blocks;
    for coord in span.coords() {
        if remaining == 0 || per_cell == 0 {
            break;
        }
        grid.cell_mut(coord)?.bits += per_cell;
        remaining -= per_cell;
    }

    // Then the remainder, one bit per cell.
    let leftover = remaining;
    for coord in span.coords() {
        if remaining == 0 {
            break;
        }
        grid.cell_mut(coord)?.bits += 1;
        remaining -= 1;
    }

    if remaining != 0 {
        return Err(ContractViolation::UnbalancedOverhead {
            group_index: group.index,
            remaining,
        });
    }

    trace!(
        group = group.index,
        blocks,
        overhead,
        per_cell,
        leftover,
        "group overhead redistributed"
    );
    Ok(OverheadSplit {
        blocks: span.len(),
        overhead,
        per_cell,
        leftover,
    })
}
