// THEORY:
// The `error` module names every way decoder input can break the grid's contract.
// Each variant is an upstream protocol error: the decoder reported something that
// cannot be reconciled with the grid, and nothing can fix it locally.
//
// Key architectural principles:
// 1.  **Return, Don't Abort**: Violations are values. The caller decides whether to
//     drop the picture or stop the whole run.
// 2.  **Say Where**: Each variant carries the coordinates, sizes or bit totals that
//     failed, plus the ingest path that rejected them, so a log line is enough to
//     find the offending report in a trace.

use std::fmt;

use thiserror::Error;

/// Convenience alias for results carrying a [`ContractViolation`].
pub type GridResult<T> = std::result::Result<T, ContractViolation>;

/// The ingest path a unit report was routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestPath {
    /// Unit exactly one cell in size.
    Native,
    /// Unit smaller than a cell, folded into its enclosing cell.
    SubUnit,
    /// Unit spanning several cells, spread across them.
    SuperUnit,
    /// Coarse group whose overhead bits are redistributed.
    Group,
}

impl fmt::Display for IngestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestPath::Native => "native",
            IngestPath::SubUnit => "sub-unit",
            IngestPath::SuperUnit => "super-unit",
            IngestPath::Group => "group",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("picture {width}x{height} outside grid capacity of {limit_width}x{limit_height}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        limit_width: u32,
        limit_height: u32,
    },

    #[error("{path} report at ({x}, {y}) is not aligned to the {cell_size}-pixel grid")]
    Misaligned {
        path: IngestPath,
        x: u32,
        y: u32,
        cell_size: u32,
    },

    #[error("unit size {size} is not valid for {path} ingest")]
    InvalidSize { path: IngestPath, size: u32 },

    #[error("cell (row {row}, col {col}) is outside the {rows}x{cols} grid")]
    OutOfBounds { row: u32, col: u32, rows: u32, cols: u32 },

    #[error("{path} report of size {size} at ({x}, {y}) covers no cell inside the picture")]
    EmptySpan {
        path: IngestPath,
        x: u32,
        y: u32,
        size: u32,
    },

    #[error("group {group_index}: children hold {child_bits} bits, over its total {total_bits}")]
    NegativeOverhead {
        group_index: u32,
        total_bits: u64,
        child_bits: u64,
    },

    #[error("group {group_index}: {remaining} overhead bits left undistributed")]
    UnbalancedOverhead { group_index: u32, remaining: u64 },

    #[error("no active picture, start() has not been called")]
    NoActivePicture,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_values() {
        let err = ContractViolation::NegativeOverhead {
            group_index: 7,
            total_bits: 10,
            child_bits: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("group 7"));
        assert!(msg.contains("12"));

        let err = ContractViolation::Misaligned {
            path: IngestPath::SuperUnit,
            x: 8,
            y: 0,
            cell_size: 16,
        };
        assert!(err.to_string().starts_with("super-unit report at (8, 0)"));
    }
}
