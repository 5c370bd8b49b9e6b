// THEORY:
// The `cell` module holds the per-cell accumulator of the reporting grid. A cell is
// one fixed 16x16 region of the picture, and every decoder report that touches that
// region eventually lands here, whatever the size of the unit the decoder coded.
//
// Key architectural principles:
// 1.  **Dumb Container**: Like the grid coordinates around it, a `CellAccumulator`
//     knows nothing about its neighbours or about the picture. It only knows how to
//     fold one contribution into itself.
// 2.  **Three Folding Rules**: A native unit overwrites the cell, a sub-unit
//     accumulates into it (bits sum, quality averages by contribution count), and a
//     share of a super-unit overwrites it with a fractional contribution count.
// 3.  **Group Tagging**: The coarse group that encloses the cell is recorded
//     separately from the cell's own bits so the overhead redistribution can add to
//     `bits` without losing what the child units reported.

pub mod cell {
    /// Identity and total of the coarse group that encloses a cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GroupTag {
        /// Identifier reported by the decoder for the group.
        pub index: u32,
        /// The group's overhead-inclusive bit total.
        pub bits: u64,
    }

    /// Running state of one grid cell for the current picture.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct CellAccumulator {
        /// Bits currently assigned to the cell, including redistributed overhead.
        pub bits: u64,
        /// Quality (QP) of the cell. Averaged over sub-units, assigned otherwise.
        pub quality: f64,
        /// Bits of the unit(s) that contributed to this cell, before overhead.
        pub unit_bits: u64,
        /// Number of native-resolution units represented by this cell.
        /// 1 for a native unit, 4 after four 8x8 units, 1/n for a share of an n-cell unit.
        pub unit_count: f64,
        /// The enclosing group, once the decoder has reported it.
        pub group: Option<GroupTag>,
    }

    impl CellAccumulator {
        /// Overwrites the cell with a unit that exactly matches the cell size.
        pub fn assign_native(&mut self, bits: u64, quality: f64) {
            self.bits = bits;
            self.quality = quality;
            self.unit_bits = bits;
            self.unit_count = 1.0;
        }

        /// Folds a unit smaller than the cell into it.
        pub fn accumulate_subunit(&mut self, bits: u64, quality: f64) {
            self.bits += bits;
            self.unit_bits += bits;

            let weighted = self.quality * self.unit_count;
            self.unit_count += 1.0;
            self.quality = (weighted + quality) / self.unit_count;
        }

        /// Overwrites the cell with its share of a unit spread over `blocks` cells.
        /// `unit_bits` keeps the whole unit's total, `bits` only this cell's share.
        pub fn assign_share(&mut self, share: u64, unit_bits: u64, quality: f64, blocks: u32) {
            self.bits = share;
            self.quality = quality;
            self.unit_bits = unit_bits;
            self.unit_count = 1.0 / f64::from(blocks);
        }

        pub fn tag_group(&mut self, index: u32, bits: u64) {
            self.group = Some(GroupTag { index, bits });
        }

        /// Quality as written to reports. Truncation toward zero is intentional.
        pub fn reported_quality(&self) -> i64 {
            self.quality as i64
        }

        /// True once any unit or group has reported into the cell this picture.
        pub fn is_occupied(&self) -> bool {
            self.unit_count > 0.0 || self.group.is_some()
        }
    }
}
