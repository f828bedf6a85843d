//! FILENAME: rollup-engine/src/cache/grid.rs
//! PURPOSE: The bucket grid — ordered map of time buckets, and the owner of
//! every operation that crosses bucket boundaries.
//! CONTEXT: Ingestion, the forward dirty cascade, fill-gap resolution, and
//! retention pruning all need predecessor/successor navigation over the
//! bucket timeline, so they live here. The grid owns all buckets and cells
//! in flat maps; everything else refers to cells by `CellKey`.
//!
//! INVARIANTS:
//! - `buckets` is strictly ordered by bucket start (BTreeMap).
//! - A cell's dirty flag is true whenever its rows differ from the content
//!   last consumed through dirty-block enumeration.
//! - A bucket's dirty hint is true whenever any contained cell is dirty
//!   (false positives allowed, false negatives never).

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Serialize};

use model::{DimensionId, GroupKey, SourceRow, Timestamp};

use crate::cache::bucket::TimeBucket;
use crate::cache::cell::{GroupCell, RowChange};
use crate::cache::dirty::DirtyBlocks;
use crate::error::RollupError;

/// Copyable handle to one grouping cell. All consumer-facing enumeration
/// hands out these instead of references, so the consumer can interleave
/// reads and writes through the grid API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellKey {
    pub bucket_start: Timestamp,
    pub group_key: GroupKey,
}

/// The two-dimensional (time bucket x group key) working set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketGrid {
    buckets: BTreeMap<Timestamp, TimeBucket>,
}

impl BucketGrid {
    /// Creates a new, empty grid.
    pub fn new() -> Self {
        BucketGrid {
            buckets: BTreeMap::new(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    // ========================================================================
    // BUCKET LOOKUP
    // ========================================================================

    /// Exact lookup by bucket start.
    pub fn bucket(&self, bucket_start: Timestamp) -> Option<&TimeBucket> {
        self.buckets.get(&bucket_start)
    }

    pub(crate) fn bucket_mut(&mut self, bucket_start: Timestamp) -> Option<&mut TimeBucket> {
        self.buckets.get_mut(&bucket_start)
    }

    /// The bucket with the greatest start strictly before `bucket_start`.
    pub fn bucket_before(&self, bucket_start: Timestamp) -> Option<&TimeBucket> {
        self.buckets
            .range(..bucket_start)
            .next_back()
            .map(|(_, bucket)| bucket)
    }

    /// The bucket with the smallest start strictly after `bucket_start`.
    pub fn bucket_after(&self, bucket_start: Timestamp) -> Option<&TimeBucket> {
        self.buckets
            .range((Excluded(bucket_start), Unbounded))
            .next()
            .map(|(_, bucket)| bucket)
    }

    fn start_before(&self, bucket_start: Timestamp) -> Option<Timestamp> {
        self.buckets
            .range(..bucket_start)
            .next_back()
            .map(|(start, _)| *start)
    }

    fn start_after(&self, bucket_start: Timestamp) -> Option<Timestamp> {
        self.buckets
            .range((Excluded(bucket_start), Unbounded))
            .next()
            .map(|(start, _)| *start)
    }

    /// Iterates buckets in ascending start order.
    pub fn buckets(&self) -> impl Iterator<Item = &TimeBucket> {
        self.buckets.values()
    }

    pub(crate) fn bucket_starts(&self) -> Vec<Timestamp> {
        self.buckets.keys().copied().collect()
    }

    /// Looks up a bucket or creates it lazily. Fails fast on an inverted
    /// range, or when the start is already registered with a different end.
    pub fn get_or_create_bucket(
        &mut self,
        dimension: DimensionId,
        bucket_start: Timestamp,
        bucket_end: Timestamp,
    ) -> Result<&mut TimeBucket, RollupError> {
        if bucket_end <= bucket_start {
            return Err(RollupError::InvalidBucketRange {
                start: bucket_start,
                end: bucket_end,
            });
        }
        if let Some(existing) = self.buckets.get(&bucket_start) {
            if existing.bucket_end() != bucket_end {
                return Err(RollupError::BucketBoundsMismatch {
                    start: bucket_start,
                    existing: existing.bucket_end(),
                    supplied: bucket_end,
                });
            }
        }
        Ok(self
            .buckets
            .entry(bucket_start)
            .or_insert_with(|| TimeBucket::new(dimension, bucket_start, bucket_end)))
    }

    // ========================================================================
    // CELL ACCESS
    // ========================================================================

    pub fn cell(&self, key: CellKey) -> Option<&GroupCell> {
        self.buckets.get(&key.bucket_start)?.cell(key.group_key)
    }

    /// Mutable cell access for the consumer (writing back output refs).
    pub fn cell_mut(&mut self, key: CellKey) -> Option<&mut GroupCell> {
        self.buckets
            .get_mut(&key.bucket_start)?
            .cell_mut(key.group_key)
    }

    // ========================================================================
    // INGESTION
    // ========================================================================

    /// Ingestion entry point. Creates the bucket and cell on demand, stores
    /// the row, and on a real change runs the forward dirty cascade.
    pub fn add_row(
        &mut self,
        dimension: DimensionId,
        bucket_start: Timestamp,
        bucket_end: Timestamp,
        group_key: GroupKey,
        row: SourceRow,
        fill_gap: bool,
    ) -> Result<RowChange, RollupError> {
        let bucket = self.get_or_create_bucket(dimension, bucket_start, bucket_end)?;
        let (_, change) = bucket.get_or_create_cell(group_key).add_row(row);
        if change.is_change() {
            self.mark_cell_dirty(bucket_start, group_key, fill_gap);
        }
        Ok(change)
    }

    /// Marks a cell dirty and, with fill-gap enabled, walks forward through
    /// every immediately-following bucket whose cell for the same group key
    /// is currently empty — those cells were displaying this cell's rows via
    /// fill-gap, so their effective output is stale too.
    ///
    /// The walk stops at the first follower that has its own rows (it does
    /// not depend on us), has no cell for the key, or is already dirty. The
    /// already-dirty check is also the idempotence terminator: marking a
    /// dirty cell again does nothing, including no further cascade.
    pub(crate) fn mark_cell_dirty(
        &mut self,
        bucket_start: Timestamp,
        group_key: GroupKey,
        fill_gap: bool,
    ) {
        let mut cursor = bucket_start;
        loop {
            let Some(bucket) = self.buckets.get_mut(&cursor) else {
                return;
            };
            let Some(cell) = bucket.cell_mut(group_key) else {
                return;
            };
            if cell.is_dirty() {
                return;
            }
            cell.set_dirty();
            bucket.set_dirty_hint();

            if !fill_gap {
                return;
            }
            let Some(next) = self.start_after(cursor) else {
                return;
            };
            match self.buckets.get(&next).and_then(|b| b.cell(group_key)) {
                Some(sibling) if !sibling.has_rows() => cursor = next,
                _ => return,
            }
        }
    }

    // ========================================================================
    // FILL-GAP RESOLUTION
    // ========================================================================

    /// Resolves the cell that actually supplies data for `(bucket_start,
    /// group_key)`. A cell with rows supplies itself. An empty cell, with
    /// fill-gap enabled, borrows from the nearest chronologically preceding
    /// sibling with the same group key — walking back through empty siblings
    /// until one has rows. With fill-gap disabled, or when no preceding
    /// sibling exists, the (empty) cell itself is returned.
    ///
    /// Returns None only if the addressed cell does not exist at all.
    pub fn effective_cell(
        &self,
        bucket_start: Timestamp,
        group_key: GroupKey,
        fill_gap: bool,
    ) -> Option<&GroupCell> {
        let mut current = self.buckets.get(&bucket_start)?.cell(group_key)?;
        if !fill_gap {
            return Some(current);
        }
        let mut cursor = bucket_start;
        loop {
            if current.has_rows() {
                return Some(current);
            }
            let Some(prev) = self.start_before(cursor) else {
                return Some(current);
            };
            match self.buckets.get(&prev).and_then(|b| b.cell(group_key)) {
                Some(sibling) => {
                    current = sibling;
                    cursor = prev;
                }
                None => return Some(current),
            }
        }
    }

    /// The earliest bucket start any cell of the given bucket currently
    /// depends on through fill-gap, floored at the bucket's own start.
    /// Returns None if the bucket does not exist.
    pub fn min_fill_gap_source(
        &self,
        bucket_start: Timestamp,
        fill_gap: bool,
    ) -> Option<Timestamp> {
        let bucket = self.buckets.get(&bucket_start)?;
        let mut min = bucket_start;
        for group_key in bucket.group_keys() {
            if let Some(source) = self.effective_cell(bucket_start, group_key, fill_gap) {
                min = min.min(source.bucket_start());
            }
        }
        Some(min)
    }

    // ========================================================================
    // DIRTY ENUMERATION
    // ========================================================================

    /// Enumerates every dirty cell, bucket by bucket in ascending time
    /// order. See `DirtyBlocks` for the clearing protocol. Single pass, not
    /// restartable.
    pub fn dirty_blocks(&mut self, clear: bool) -> DirtyBlocks<'_> {
        DirtyBlocks::new(self, clear)
    }

    // ========================================================================
    // RETENTION PRUNING
    // ========================================================================

    /// Deletes old, fully-processed buckets that are provably not needed as
    /// fill-gap sources, keeping the most recent `retention_count`
    /// otherwise-eligible buckets as a buffer. Returns the starts of the
    /// removed buckets, ascending.
    ///
    /// Only the contiguous not-dirty prefix before the first dirty bucket is
    /// ever considered. The first dirty bucket's earliest fill-gap source is
    /// the safety threshold: no later, not-yet-processed bucket in the
    /// scanned prefix can reach further back than that, and the threshold
    /// bucket itself is a live source, so only strictly older buckets are
    /// deletable. If the grid contains no dirty bucket at all, nothing is
    /// removed.
    pub fn prune_old_buckets(&mut self, retention_count: usize, fill_gap: bool) -> Vec<Timestamp> {
        let mut candidates: Vec<Timestamp> = Vec::new();
        let mut first_dirty = None;
        for (start, bucket) in &self.buckets {
            if bucket.has_dirty_hint() {
                first_dirty = Some(*start);
                break;
            }
            candidates.push(*start);
        }

        let Some(dirty_start) = first_dirty else {
            return Vec::new();
        };
        if candidates.is_empty() {
            return Vec::new();
        }

        let Some(threshold) = self.min_fill_gap_source(dirty_start, fill_gap) else {
            return Vec::new();
        };
        candidates.retain(|start| *start < threshold);

        if candidates.len() <= retention_count {
            return Vec::new();
        }
        let cut = candidates.len() - retention_count;
        let removed: Vec<Timestamp> = candidates.drain(..cut).collect();
        for start in &removed {
            self.buckets.remove(start);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{SourceValue, SourceRow};

    const DIM: DimensionId = 1;
    const WIDTH: Timestamp = 60;
    const G: GroupKey = GroupKey(42);

    fn row(id: u64, n: f64) -> SourceRow {
        SourceRow::new(id, vec![SourceValue::number(n)])
    }

    fn key(bucket: i64) -> CellKey {
        CellKey {
            bucket_start: bucket * WIDTH,
            group_key: G,
        }
    }

    /// Adds a row for group G into the given bucket index.
    fn add(grid: &mut BucketGrid, bucket: i64, id: u64, n: f64, fill_gap: bool) -> RowChange {
        grid.add_row(
            DIM,
            bucket * WIDTH,
            (bucket + 1) * WIDTH,
            G,
            row(id, n),
            fill_gap,
        )
        .unwrap()
    }

    /// Creates an empty (row-less, clean) cell for group G in a bucket.
    fn add_empty_cell(grid: &mut BucketGrid, bucket: i64) {
        grid.get_or_create_bucket(DIM, bucket * WIDTH, (bucket + 1) * WIDTH)
            .unwrap()
            .get_or_create_cell(G);
    }

    fn drain_all(grid: &mut BucketGrid) {
        let _ = grid.dirty_blocks(true).count();
    }

    #[test]
    fn test_rejects_inverted_bucket_range() {
        let mut grid = BucketGrid::new();
        let err = grid
            .add_row(DIM, 60, 60, G, row(1, 1.0), false)
            .unwrap_err();
        assert_eq!(err, RollupError::InvalidBucketRange { start: 60, end: 60 });
    }

    #[test]
    fn test_rejects_mismatched_bucket_end() {
        let mut grid = BucketGrid::new();
        add(&mut grid, 0, 1, 1.0, false);
        let err = grid
            .add_row(DIM, 0, 90, G, row(2, 2.0), false)
            .unwrap_err();
        assert_eq!(
            err,
            RollupError::BucketBoundsMismatch {
                start: 0,
                existing: 60,
                supplied: 90
            }
        );
    }

    #[test]
    fn test_predecessor_and_successor_lookup() {
        let mut grid = BucketGrid::new();
        for bucket in [0, 2, 4] {
            add(&mut grid, bucket, bucket as u64 + 1, 1.0, false);
        }

        assert_eq!(grid.bucket_before(0).map(|b| b.bucket_start()), None);
        assert_eq!(
            grid.bucket_before(2 * WIDTH).map(|b| b.bucket_start()),
            Some(0)
        );
        // Lookups work from any timestamp, not just registered starts
        assert_eq!(
            grid.bucket_before(3 * WIDTH).map(|b| b.bucket_start()),
            Some(2 * WIDTH)
        );
        assert_eq!(
            grid.bucket_after(2 * WIDTH).map(|b| b.bucket_start()),
            Some(4 * WIDTH)
        );
        assert_eq!(grid.bucket_after(4 * WIDTH).map(|b| b.bucket_start()), None);
    }

    #[test]
    fn test_dirty_on_change_only() {
        // P1: new id dirties, changed value dirties, unchanged value does not
        let mut grid = BucketGrid::new();

        assert_eq!(add(&mut grid, 0, 1, 10.0, false), RowChange::Inserted);
        assert!(grid.cell(key(0)).unwrap().is_dirty());

        drain_all(&mut grid);
        assert!(!grid.cell(key(0)).unwrap().is_dirty());

        assert_eq!(add(&mut grid, 0, 1, 10.0, false), RowChange::Unchanged);
        assert!(!grid.cell(key(0)).unwrap().is_dirty());

        assert_eq!(add(&mut grid, 0, 1, 11.0, false), RowChange::Replaced);
        assert!(grid.cell(key(0)).unwrap().is_dirty());
    }

    #[test]
    fn test_forward_cascade_through_empty_followers() {
        // P2: t1 and t2 empty for the group, fill-gap on: a change in t0
        // flags all three
        let mut grid = BucketGrid::new();
        add_empty_cell(&mut grid, 1);
        add_empty_cell(&mut grid, 2);

        add(&mut grid, 0, 1, 10.0, true);

        assert!(grid.cell(key(0)).unwrap().is_dirty());
        assert!(grid.cell(key(1)).unwrap().is_dirty());
        assert!(grid.cell(key(2)).unwrap().is_dirty());
        assert!(grid.bucket(WIDTH).unwrap().has_dirty_hint());
        assert!(grid.bucket(2 * WIDTH).unwrap().has_dirty_hint());
    }

    #[test]
    fn test_no_cascade_past_occupied_follower() {
        // P3: t1 has its own rows, so neither t1 nor t2 depends on t0
        let mut grid = BucketGrid::new();
        add(&mut grid, 1, 2, 20.0, true);
        add_empty_cell(&mut grid, 2);
        drain_all(&mut grid);

        add(&mut grid, 0, 1, 10.0, true);

        assert!(grid.cell(key(0)).unwrap().is_dirty());
        assert!(!grid.cell(key(1)).unwrap().is_dirty());
        assert!(!grid.cell(key(2)).unwrap().is_dirty());
    }

    #[test]
    fn test_no_cascade_when_fill_gap_disabled() {
        let mut grid = BucketGrid::new();
        add_empty_cell(&mut grid, 1);

        add(&mut grid, 0, 1, 10.0, false);

        assert!(grid.cell(key(0)).unwrap().is_dirty());
        assert!(!grid.cell(key(1)).unwrap().is_dirty());
    }

    #[test]
    fn test_cascade_skips_followers_without_cell_for_key() {
        // t1 exists but has no cell for G, so the chain is broken there
        let mut grid = BucketGrid::new();
        grid.get_or_create_bucket(DIM, WIDTH, 2 * WIDTH).unwrap();
        add_empty_cell(&mut grid, 2);

        add(&mut grid, 0, 1, 10.0, true);

        assert!(grid.cell(key(0)).unwrap().is_dirty());
        assert!(!grid.cell(key(2)).unwrap().is_dirty());
    }

    #[test]
    fn test_mark_dirty_is_idempotent() {
        // P7: a second change to an already-dirty cell does not re-cascade
        let mut grid = BucketGrid::new();
        add_empty_cell(&mut grid, 1);
        add_empty_cell(&mut grid, 2);

        add(&mut grid, 0, 1, 10.0, true);
        // Simulate the consumer having processed only the tail of the chain
        grid.cell_mut(key(1)).unwrap().clear_dirty();
        grid.cell_mut(key(2)).unwrap().clear_dirty();

        // t0 is still dirty, so this change terminates immediately
        add(&mut grid, 0, 1, 11.0, true);

        assert!(grid.cell(key(0)).unwrap().is_dirty());
        assert!(!grid.cell(key(1)).unwrap().is_dirty());
        assert!(!grid.cell(key(2)).unwrap().is_dirty());
    }

    #[test]
    fn test_fill_gap_resolution() {
        // P4: t0 occupied, t1 and t2 empty
        let mut grid = BucketGrid::new();
        add(&mut grid, 0, 1, 10.0, true);
        add_empty_cell(&mut grid, 1);
        add_empty_cell(&mut grid, 2);

        let source = grid.effective_cell(2 * WIDTH, G, true).unwrap();
        assert_eq!(source.bucket_start(), 0);
        assert_eq!(source.row_count(), 1);

        let own = grid.effective_cell(2 * WIDTH, G, false).unwrap();
        assert_eq!(own.bucket_start(), 2 * WIDTH);
        assert!(!own.has_rows());
    }

    #[test]
    fn test_fill_gap_stops_at_missing_sibling() {
        // t1 has no cell for G; t2 cannot reach past it
        let mut grid = BucketGrid::new();
        add(&mut grid, 0, 1, 10.0, true);
        grid.get_or_create_bucket(DIM, WIDTH, 2 * WIDTH).unwrap();
        add_empty_cell(&mut grid, 2);

        let source = grid.effective_cell(2 * WIDTH, G, true).unwrap();
        assert_eq!(source.bucket_start(), 2 * WIDTH);
        assert!(!source.has_rows());
    }

    #[test]
    fn test_occupied_cell_is_its_own_source() {
        let mut grid = BucketGrid::new();
        add(&mut grid, 0, 1, 10.0, true);
        add(&mut grid, 1, 2, 20.0, true);

        let source = grid.effective_cell(WIDTH, G, true).unwrap();
        assert_eq!(source.bucket_start(), WIDTH);
    }

    #[test]
    fn test_min_fill_gap_source() {
        let mut grid = BucketGrid::new();
        add(&mut grid, 2, 1, 10.0, true);
        add_empty_cell(&mut grid, 3);
        add_empty_cell(&mut grid, 4);

        assert_eq!(grid.min_fill_gap_source(4 * WIDTH, true), Some(2 * WIDTH));
        // Without fill-gap the bucket depends only on itself
        assert_eq!(grid.min_fill_gap_source(4 * WIDTH, false), Some(4 * WIDTH));
        assert_eq!(grid.min_fill_gap_source(9 * WIDTH, true), None);
    }

    #[test]
    fn test_pruning_retains_live_fill_gap_source() {
        // P6: t0..t5, t5 dirty and gap-filling back to t2; with a retention
        // buffer of zero only t0 and t1 may go
        let mut grid = BucketGrid::new();
        add(&mut grid, 0, 1, 1.0, true);
        add(&mut grid, 1, 2, 2.0, true);
        add(&mut grid, 2, 3, 3.0, true);
        drain_all(&mut grid);

        add_empty_cell(&mut grid, 3);
        add_empty_cell(&mut grid, 4);
        add_empty_cell(&mut grid, 5);
        // Buckets 3..5 were created dirty-hinted; settle all but 5
        grid.bucket_mut(3 * WIDTH).unwrap().clear_dirty_hint();
        grid.bucket_mut(4 * WIDTH).unwrap().clear_dirty_hint();
        grid.cell_mut(key(5)).unwrap().set_dirty();

        let removed = grid.prune_old_buckets(0, true);

        assert_eq!(removed, vec![0, WIDTH]);
        assert!(grid.bucket(2 * WIDTH).is_some());
        assert!(grid.bucket(3 * WIDTH).is_some());
        assert!(grid.bucket(5 * WIDTH).is_some());
    }

    #[test]
    fn test_pruning_respects_retention_buffer() {
        let mut grid = BucketGrid::new();
        for bucket in 0..6 {
            add(&mut grid, bucket, bucket as u64 + 1, 1.0, false);
        }
        drain_all(&mut grid);
        // Re-dirty only the newest bucket
        add(&mut grid, 5, 100, 9.0, false);

        // Without fill-gap the threshold is the dirty bucket itself, so
        // t0..t4 are candidates; a buffer of 3 leaves t2..t4
        let removed = grid.prune_old_buckets(3, false);

        assert_eq!(removed, vec![0, WIDTH]);
        assert_eq!(grid.bucket_count(), 4);
    }

    #[test]
    fn test_no_pruning_without_a_dirty_bucket() {
        let mut grid = BucketGrid::new();
        for bucket in 0..4 {
            add(&mut grid, bucket, bucket as u64 + 1, 1.0, false);
        }
        drain_all(&mut grid);

        assert!(grid.prune_old_buckets(0, false).is_empty());
        assert_eq!(grid.bucket_count(), 4);
    }

    #[test]
    fn test_no_pruning_when_oldest_bucket_is_dirty() {
        let mut grid = BucketGrid::new();
        for bucket in 0..4 {
            add(&mut grid, bucket, bucket as u64 + 1, 1.0, false);
        }
        // Everything is still unprocessed; candidate prefix is empty
        assert!(grid.prune_old_buckets(0, false).is_empty());
        assert_eq!(grid.bucket_count(), 4);
    }
}
