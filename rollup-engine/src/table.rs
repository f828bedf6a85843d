//! FILENAME: rollup-engine/src/table.rs
//! Dimension Table - The materialized output.
//!
//! This module holds what the consumer side produces: one `DimensionRow`
//! per (time bucket, group key) cell, addressed by an `OutputRef`. The
//! cache stores the ref back into the cell verbatim and never interprets
//! it; only this module resolves refs to rows.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use model::{DimensionId, GroupKey, Timestamp};

use crate::definition::GroupValues;

/// Opaque reference to a materialized row. Allocated by `DimensionTable`,
/// stored in grouping cells, meaningless anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef(pub u64);

/// One materialized output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionRow {
    pub dimension: DimensionId,
    pub bucket_start: Timestamp,
    pub bucket_end: Timestamp,
    pub group_key: GroupKey,
    /// The grouping column values behind the key, for readable output.
    pub group_values: GroupValues,
    /// One aggregate per value field of the definition, in field order.
    pub values: Vec<f64>,
    /// Where the rows actually came from: equal to `bucket_start` for a
    /// cell with its own rows, earlier when the result was borrowed through
    /// fill-gap.
    pub source_bucket_start: Timestamp,
}

/// In-memory materialized table, keyed by output reference.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DimensionTable {
    rows: FxHashMap<OutputRef, DimensionRow>,
    next_ref: u64,
}

impl DimensionTable {
    pub fn new() -> Self {
        DimensionTable {
            rows: FxHashMap::default(),
            next_ref: 0,
        }
    }

    /// Stores a new row and returns its reference.
    pub fn insert(&mut self, row: DimensionRow) -> OutputRef {
        let output_ref = OutputRef(self.next_ref);
        self.next_ref += 1;
        self.rows.insert(output_ref, row);
        output_ref
    }

    /// Overwrites the row behind an existing reference. Returns false when
    /// the reference is unknown (the row is inserted anyway so the cell's
    /// stored ref stays resolvable).
    pub fn replace(&mut self, output_ref: OutputRef, row: DimensionRow) -> bool {
        self.rows.insert(output_ref, row).is_some()
    }

    pub fn get(&self, output_ref: OutputRef) -> Option<&DimensionRow> {
        self.rows.get(&output_ref)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OutputRef, &DimensionRow)> {
        self.rows.iter().map(|(r, row)| (*r, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;
    use model::SourceValue;

    fn sample_row(bucket_start: Timestamp, total: f64) -> DimensionRow {
        DimensionRow {
            dimension: 1,
            bucket_start,
            bucket_end: bucket_start + 60,
            group_key: GroupKey(5),
            group_values: smallvec![SourceValue::text("North")],
            values: vec![total],
            source_bucket_start: bucket_start,
        }
    }

    #[test]
    fn test_insert_allocates_distinct_refs() {
        let mut table = DimensionTable::new();
        let a = table.insert(sample_row(0, 10.0));
        let b = table.insert(sample_row(60, 20.0));

        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(a).unwrap().values, vec![10.0]);
    }

    #[test]
    fn test_replace_overwrites_in_place() {
        let mut table = DimensionTable::new();
        let r = table.insert(sample_row(0, 10.0));

        assert!(table.replace(r, sample_row(0, 30.0)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(r).unwrap().values, vec![30.0]);
    }
}
