//! FILENAME: rollup-engine/src/cache/bucket.rs
//! PURPOSE: The time bucket — group key -> grouping cell map for one interval.
//! CONTEXT: Buckets carry an aggregate dirty hint so enumeration can skip
//! whole intervals cheaply. The hint may be a false positive relative to the
//! individual cells (a drained bucket keeps its hint until the grid-level
//! pass clears it) but never a false negative: whenever a contained cell is
//! dirty, the hint is true.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use model::{DimensionId, GroupKey, Timestamp};

use crate::cache::cell::GroupCell;

/// One time interval `[bucket_start, bucket_end)` of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    bucket_start: Timestamp,
    bucket_end: Timestamp,
    dimension: DimensionId,
    cells: FxHashMap<GroupKey, GroupCell>,
    dirty_hint: bool,
}

impl TimeBucket {
    /// Creates an empty bucket. New buckets start with the dirty hint set,
    /// consistent with "never processed".
    pub fn new(dimension: DimensionId, bucket_start: Timestamp, bucket_end: Timestamp) -> Self {
        TimeBucket {
            bucket_start,
            bucket_end,
            dimension,
            cells: FxHashMap::default(),
            dirty_hint: true,
        }
    }

    pub fn bucket_start(&self) -> Timestamp {
        self.bucket_start
    }

    pub fn bucket_end(&self) -> Timestamp {
        self.bucket_end
    }

    pub fn dimension(&self) -> DimensionId {
        self.dimension
    }

    /// Looks up the cell for a group key, or inserts a new empty, clean one.
    pub fn get_or_create_cell(&mut self, group_key: GroupKey) -> &mut GroupCell {
        let start = self.bucket_start;
        self.cells
            .entry(group_key)
            .or_insert_with(|| GroupCell::new(start, group_key))
    }

    pub fn cell(&self, group_key: GroupKey) -> Option<&GroupCell> {
        self.cells.get(&group_key)
    }

    pub(crate) fn cell_mut(&mut self, group_key: GroupKey) -> Option<&mut GroupCell> {
        self.cells.get_mut(&group_key)
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Iterates the group keys present in this bucket, in unspecified order.
    pub fn group_keys(&self) -> impl Iterator<Item = GroupKey> + '_ {
        self.cells.keys().copied()
    }

    pub fn cells(&self) -> impl Iterator<Item = &GroupCell> {
        self.cells.values()
    }

    pub fn has_dirty_hint(&self) -> bool {
        self.dirty_hint
    }

    pub(crate) fn set_dirty_hint(&mut self) {
        self.dirty_hint = true;
    }

    pub(crate) fn clear_dirty_hint(&mut self) {
        self.dirty_hint = false;
    }

    /// Lazily yields the cells that are currently dirty, in unspecified
    /// order. With `clear` set, each cell's flag is cleared just before the
    /// cell is yielded, so a cell re-dirtied while the consumer processes an
    /// earlier yield shows up again on the next enumeration pass instead of
    /// being lost. Single pass, not restartable.
    ///
    /// The bucket's own hint is untouched here; clearing it is the grid
    /// enumeration's job.
    pub fn dirty_cells(&mut self, clear: bool) -> impl Iterator<Item = &mut GroupCell> {
        self.cells.values_mut().filter_map(move |cell| {
            if cell.is_dirty() {
                if clear {
                    cell.clear_dirty();
                }
                Some(cell)
            } else {
                None
            }
        })
    }
}
