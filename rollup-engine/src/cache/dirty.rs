//! FILENAME: rollup-engine/src/cache/dirty.rs
//! PURPOSE: The dirty-block enumeration iterator.
//! CONTEXT: Implements the two-level drain protocol over the grid: buckets
//! are visited in ascending time order, and only buckets whose dirty hint is
//! set are descended into. Clearing is just-in-time — a bucket's hint is
//! cleared immediately before descending, and a cell's flag immediately
//! before its key is yielded. That ordering is what keeps re-dirtying
//! correct: a cell re-flagged while the consumer processes an earlier yield
//! (via the forward cascade) re-raises the already-cleared flags and is
//! picked up by the *next* pass instead of being lost.

use std::collections::VecDeque;

use model::Timestamp;

use crate::cache::grid::{BucketGrid, CellKey};

/// Lazy, finite, single-pass enumeration of dirty cells.
///
/// The bucket order is snapshotted when the iterator is created; buckets
/// added afterwards are left for the next pass. Yields copyable `CellKey`
/// handles — the consumer reads and writes the cell through the grid once
/// the iteration step returns.
pub struct DirtyBlocks<'a> {
    grid: &'a mut BucketGrid,
    /// Bucket starts not yet visited, ascending.
    remaining: VecDeque<Timestamp>,
    /// Cell keys of the bucket currently being drained.
    pending: VecDeque<CellKey>,
    clear: bool,
}

impl<'a> DirtyBlocks<'a> {
    pub(crate) fn new(grid: &'a mut BucketGrid, clear: bool) -> Self {
        let remaining = grid.bucket_starts().into();
        DirtyBlocks {
            grid,
            remaining,
            pending: VecDeque::new(),
            clear,
        }
    }
}

impl Iterator for DirtyBlocks<'_> {
    type Item = CellKey;

    fn next(&mut self) -> Option<CellKey> {
        loop {
            // Drain the current bucket's candidates first. A candidate is
            // only yielded if it is dirty at the moment we reach it.
            if let Some(key) = self.pending.pop_front() {
                let Some(cell) = self.grid.cell_mut(key) else {
                    continue;
                };
                if !cell.is_dirty() {
                    continue;
                }
                if self.clear {
                    cell.clear_dirty();
                }
                return Some(key);
            }

            // Advance to the next hinted bucket.
            let bucket_start = self.remaining.pop_front()?;
            let Some(bucket) = self.grid.bucket_mut(bucket_start) else {
                continue;
            };
            if !bucket.has_dirty_hint() {
                continue;
            }
            if self.clear {
                bucket.clear_dirty_hint();
            }
            self.pending = bucket
                .group_keys()
                .map(|group_key| CellKey {
                    bucket_start,
                    group_key,
                })
                .collect();
        }
    }
}
