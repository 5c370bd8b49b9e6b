// THEORY:
// The `PictureSession` owns the lifecycle of one picture's grid. The decoder drives
// it with `start`, a batch of unit and group reports, and `finish`; the session
// decides what is a new picture, what is a repeat, and hands a finished picture to
// the reporters as a read-only snapshot.
//
// Key architectural principles:
// 1.  **Explicit State Machine**: `Idle -> Active -> Idle` for a genuinely new
//     picture and `Idle -> Suppressed -> Idle` for a repeated POC. The repeat is a
//     known decoder quirk (the first picture is emitted twice); while suppressed,
//     every report is ignored so the first occurrence's grid stays intact, and
//     `finish` produces nothing.
// 2.  **Owned, Not Global**: The session is an ordinary value owned by the caller.
//     Independent sessions can coexist, one per stream.
// 3.  **Borrowed Snapshot**: `finish` returns a `PictureSnapshot` borrowing the grid.
//     The borrow checker guarantees the grid cannot change while a reporter reads
//     it, and the next `start` can only happen once the snapshot is gone.

use tracing::{debug, info, trace, warn};

use crate::core_modules::error::{ContractViolation, GridResult};
use crate::core_modules::grid_store::{CellCoord, GRID_CELL_SIZE, GROUP_SIZE, GridStore};
use crate::core_modules::resampler::{self, Extent, GroupReport, OverheadSplit, UnitReport};

/// Where the session is in the per-picture protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No picture in flight. Either nothing has started yet or the last one finished.
    Idle,
    /// A new picture is being accumulated.
    Active,
    /// The current `start` repeated the previous POC; reports are ignored.
    Suppressed,
}

/// What `start` decided about the picture it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new POC: the grid was reset and a picture index assigned.
    NewPicture { picture_index: u32 },
    /// Same POC as the previous picture: this occurrence is suppressed.
    Duplicate,
}

/// Lifecycle owner of one picture's grid.
#[derive(Debug, Clone)]
pub struct PictureSession {
    state: SessionState,
    /// POC of the last genuinely new picture, `None` before the first one.
    poc: Option<i32>,
    /// Index of the current picture in the sequence.
    picture_index: u32,
    /// Index the next new picture will receive.
    next_picture_index: u32,
    grid: GridStore,
    extent: Extent,
}

impl Default for PictureSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PictureSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            poc: None,
            picture_index: 0,
            next_picture_index: 0,
            grid: GridStore::default(),
            extent: Extent::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// POC of the current (or last) picture.
    pub fn poc(&self) -> Option<i32> {
        self.poc
    }

    pub fn picture_index(&self) -> u32 {
        self.picture_index
    }

    pub fn grid(&self) -> &GridStore {
        &self.grid
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    /// Begins a picture.
    ///
    /// A POC different from the previous one resets the grid to the new picture's
    /// dimensions and assigns the next picture index. Repeating the previous POC
    /// leaves all picture state untouched and suppresses the picture.
    pub fn start(&mut self, poc: i32, width: u32, height: u32) -> GridResult<StartOutcome> {
        GridStore::validate_dimensions(width, height)?;

        if self.poc == Some(poc) {
            self.state = SessionState::Suppressed;
            info!(poc, "repeated POC, suppressing picture");
            return Ok(StartOutcome::Duplicate);
        }

        if self.state == SessionState::Active {
            warn!(
                picture_index = self.picture_index,
                poc = ?self.poc,
                "picture was never finished, discarding it"
            );
        }

        self.grid = GridStore::new(width, height)?;
        self.extent = Extent::default();
        self.poc = Some(poc);
        self.picture_index = self.next_picture_index;
        self.next_picture_index += 1;
        self.state = SessionState::Active;

        debug!(
            picture_index = self.picture_index,
            poc,
            width,
            height,
            rows = self.grid.rows(),
            cols = self.grid.cols(),
            "picture started"
        );
        Ok(StartOutcome::NewPicture {
            picture_index: self.picture_index,
        })
    }

    /// Grid and extent of the picture being accumulated, `None` while suppressed.
    fn active(&mut self) -> GridResult<Option<(&mut GridStore, &mut Extent)>> {
        match self.state {
            SessionState::Idle => Err(ContractViolation::NoActivePicture),
            SessionState::Suppressed => {
                trace!("report ignored, picture suppressed");
                Ok(None)
            }
            SessionState::Active => Ok(Some((&mut self.grid, &mut self.extent))),
        }
    }

    /// Routes a unit report to the native, sub-unit or super-unit rule by its size.
    pub fn ingest_unit(&mut self, unit: &UnitReport) -> GridResult<()> {
        match self.active()? {
            Some((grid, extent)) => resampler::ingest_unit(grid, extent, unit),
            None => Ok(()),
        }
    }

    /// Records a macroblock addressed directly in cell coordinates.
    pub fn ingest_macroblock(
        &mut self,
        col: u32,
        row: u32,
        bits: u64,
        quality: f64,
    ) -> GridResult<()> {
        let out_of_bounds = || ContractViolation::OutOfBounds {
            row,
            col,
            rows: self.grid.rows(),
            cols: self.grid.cols(),
        };
        let x = col.checked_mul(GRID_CELL_SIZE).ok_or_else(out_of_bounds)?;
        let y = row.checked_mul(GRID_CELL_SIZE).ok_or_else(out_of_bounds)?;
        let unit = UnitReport {
            x,
            y,
            size: GRID_CELL_SIZE,
            bits,
            quality,
        };
        match self.active()? {
            Some((grid, extent)) => resampler::ingest_native(grid, extent, &unit),
            None => Ok(()),
        }
    }

    /// Spreads a group's overhead over its cells. Must follow all of the group's
    /// unit reports. `None` while suppressed.
    pub fn ingest_group(&mut self, group: &GroupReport) -> GridResult<Option<OverheadSplit>> {
        match self.active()? {
            Some((grid, _)) => resampler::ingest_group(grid, group).map(Some),
            None => Ok(None),
        }
    }

    /// Ends the current picture.
    ///
    /// Returns the snapshot to report, or `None` for a suppressed repeat.
    pub fn finish(&mut self) -> GridResult<Option<PictureSnapshot<'_>>> {
        match self.state {
            SessionState::Idle => Err(ContractViolation::NoActivePicture),
            SessionState::Suppressed => {
                self.state = SessionState::Idle;
                debug!(poc = ?self.poc, "suppressed picture finished, nothing reported");
                Ok(None)
            }
            SessionState::Active => {
                self.state = SessionState::Idle;
                debug!(
                    picture_index = self.picture_index,
                    poc = ?self.poc,
                    max_row = self.extent.max_row,
                    max_col = self.extent.max_col,
                    total_bits = self.grid.total_bits(),
                    "picture finished"
                );
                Ok(Some(PictureSnapshot {
                    picture_index: self.picture_index,
                    poc: self.poc.unwrap_or_default(),
                    extent: self.extent,
                    grid: &self.grid,
                }))
            }
        }
    }
}

/// Read-only view of a finished picture, as handed to the reporters.
#[derive(Debug, Clone, Copy)]
pub struct PictureSnapshot<'a> {
    pub picture_index: u32,
    pub poc: i32,
    pub extent: Extent,
    pub grid: &'a GridStore,
}

/// One cell line of the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellEntry {
    pub coord: CellCoord,
    /// Row-major index within the extent: `row * (max_col + 1) + col`.
    pub index: u32,
    pub bits: u64,
    /// Truncated quality.
    pub quality: i64,
}

/// One group line of the report, sampled at the group's anchor cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupEntry {
    pub coord: CellCoord,
    pub group_index: u32,
    pub group_bits: u64,
    pub quality: i64,
}

impl<'a> PictureSnapshot<'a> {
    /// Every cell of the extent rectangle, row-major. Untouched cells report zeros.
    pub fn cells(self) -> impl Iterator<Item = CellEntry> + 'a {
        let stride = self.extent.width();
        let grid = self.grid;
        (0..self.extent.height()).flat_map(move |row| {
            (0..stride).map(move |col| {
                let coord = CellCoord::new(row, col);
                let cell = grid.get(coord).copied().unwrap_or_default();
                CellEntry {
                    coord,
                    index: row * stride + col,
                    bits: cell.bits,
                    quality: cell.reported_quality(),
                }
            })
        })
    }

    /// One entry per group anchor of the extent, row-major, stepping one group at a time.
    pub fn groups(self) -> impl Iterator<Item = GroupEntry> + 'a {
        let step = (GROUP_SIZE / GRID_CELL_SIZE) as usize;
        let Extent { max_row, max_col } = self.extent;
        let grid = self.grid;
        (0..=max_row).step_by(step).flat_map(move |row| {
            (0..=max_col).step_by(step).map(move |col| {
                let coord = CellCoord::new(row, col);
                let cell = grid.get(coord).copied().unwrap_or_default();
                let (group_index, group_bits) =
                    cell.group.map(|g| (g.index, g.bits)).unwrap_or((0, 0));
                GroupEntry {
                    coord,
                    group_index,
                    group_bits,
                    quality: cell.reported_quality(),
                }
            })
        })
    }

    /// Number of cells inside the extent that received any report.
    pub fn occupied_cells(self) -> usize {
        self.cells()
            .filter(|entry| self.grid.get(entry.coord).is_some_and(|c| c.is_occupied()))
            .count()
    }
}
