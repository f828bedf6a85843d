//! FILENAME: rollup-engine/src/cache/cell.rs
//! PURPOSE: The grouping cell — row set for one (time bucket, group key) pair.
//! CONTEXT: A cell owns the rows currently assigned to it, a dirty flag that
//! is true whenever the rows differ from what was last consumed through
//! dirty-block enumeration, and the opaque reference the materializer wrote
//! back for this cell. The cell itself never navigates to siblings; the grid
//! does that by key, so the cell stays free of back-pointers.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use model::{GroupKey, RowId, SourceRow, Timestamp};

use crate::table::OutputRef;

/// Outcome of storing a row into a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    /// The row id was not present before.
    Inserted,
    /// The row id was present with different values; the row was replaced.
    Replaced,
    /// The row id was present with equal values; nothing happened.
    Unchanged,
}

impl RowChange {
    /// Whether this outcome requires dirty-marking.
    pub fn is_change(self) -> bool {
        !matches!(self, RowChange::Unchanged)
    }
}

/// The row set for one (time bucket, group key) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupCell {
    bucket_start: Timestamp,
    group_key: GroupKey,
    rows: FxHashMap<RowId, SourceRow>,
    dirty: bool,
    /// Written by the materializer after it persists this cell's output.
    /// The cache stores it verbatim and never interprets it.
    output_ref: Option<OutputRef>,
}

impl GroupCell {
    /// Creates an empty, clean cell.
    pub fn new(bucket_start: Timestamp, group_key: GroupKey) -> Self {
        GroupCell {
            bucket_start,
            group_key,
            rows: FxHashMap::default(),
            dirty: false,
            output_ref: None,
        }
    }

    /// Stores a row and returns the stored copy with what happened.
    /// Inserts when the id is new, replaces when the stored row differs by
    /// value equality, and does nothing when it is equal (no dirty
    /// re-trigger for redeliveries); in the Unchanged case the returned row
    /// is the one already held.
    ///
    /// Dirty-marking is the grid's job; it needs sibling navigation for the
    /// forward cascade, so this only reports what happened.
    pub fn add_row(&mut self, row: SourceRow) -> (&SourceRow, RowChange) {
        match self.rows.entry(row.id) {
            Entry::Vacant(slot) => (&*slot.insert(row), RowChange::Inserted),
            Entry::Occupied(mut slot) => {
                if *slot.get() != row {
                    slot.insert(row);
                    (&*slot.into_mut(), RowChange::Replaced)
                } else {
                    (&*slot.into_mut(), RowChange::Unchanged)
                }
            }
        }
    }

    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, id: RowId) -> Option<&SourceRow> {
        self.rows.get(&id)
    }

    /// Iterates this cell's own rows, in unspecified order.
    pub fn rows(&self) -> impl Iterator<Item = &SourceRow> {
        self.rows.values()
    }

    pub fn bucket_start(&self) -> Timestamp {
        self.bucket_start
    }

    pub fn group_key(&self) -> GroupKey {
        self.group_key
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn output_ref(&self) -> Option<OutputRef> {
        self.output_ref
    }

    /// Records the materializer's output reference. Does not touch the dirty
    /// flag: writing a result back is consumption, not a change.
    pub fn set_output_ref(&mut self, output_ref: OutputRef) {
        self.output_ref = Some(output_ref);
    }
}
