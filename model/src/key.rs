//! FILENAME: model/src/key.rs
//! PURPOSE: Scalar key and index types shared across the workspace.
//! CONTEXT: Time buckets are addressed by their start timestamp, grouping
//! cells by a hash of their grouping column values. Keeping these as small
//! copyable keys (rather than references into the structures that own them)
//! is what lets the cache store everything in flat maps owned by the grid.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};

use crate::value::SourceValue;

/// Epoch milliseconds. Bucket boundaries are half-open `[start, end)`.
pub type Timestamp = i64;

/// Unique identifier of a grouping schema (dimension) within the host.
pub type DimensionId = u32;

/// Index into the source data columns (0-based).
pub type FieldIndex = usize;

/// Identifier of a dimension-grouping within a time bucket: a hash of the
/// row's grouping column values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(pub u64);

impl GroupKey {
    /// Derives the group key from the grouping column values, in field
    /// order. The same values always produce the same key.
    pub fn of<'a, I>(values: I) -> GroupKey
    where
        I: IntoIterator<Item = &'a SourceValue>,
    {
        let mut hasher = FxHasher::default();
        for value in values {
            value.hash(&mut hasher);
        }
        GroupKey(hasher.finish())
    }
}
