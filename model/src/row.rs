//! FILENAME: model/src/row.rs
//! PURPOSE: Defines the source row — the atomic unit of ingested data.
//! CONTEXT: A row has a stable identity (`RowId`) and a list of column
//! values. Identity decides *which* cell entry a row updates; value equality
//! over the columns decides *whether* that update is a real change. Designed
//! to be lightweight as large numbers of these are held in the working set.

use serde::{Deserialize, Serialize};

use crate::key::FieldIndex;
use crate::value::SourceValue;

/// Stable identity of a source row across re-deliveries.
pub type RowId = u64;

/// A single ingested record.
///
/// Two rows are equal when their column values are equal; the id is an
/// identity, and a later delivery of the same id with different values
/// replaces the stored row wholesale (rows are never merged).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    pub id: RowId,
    pub values: Vec<SourceValue>,
}

impl SourceRow {
    pub fn new(id: RowId, values: Vec<SourceValue>) -> Self {
        SourceRow { id, values }
    }

    /// Returns the value of the given column, or None if the row is too
    /// short.
    pub fn value_at(&self, index: FieldIndex) -> Option<&SourceValue> {
        self.values.get(index)
    }
}
