//! FILENAME: rollup-engine/src/definition.rs
//! Rollup Definition - The serializable configuration.
//!
//! This module contains all the types needed to DESCRIBE a rollup.
//! These structures are designed to be:
//! - Serializable (for saving/loading host configuration)
//! - Immutable snapshots of operator intent
//!
//! The definition says which columns group, which columns aggregate, and how
//! wide the time buckets are. It never holds cached state; that lives in
//! `cache`.

use serde::{Deserialize, Serialize};

use model::{FieldIndex, GroupKey, SourceRow, Timestamp};
use smallvec::SmallVec;

use crate::error::RollupError;

/// Grouping column values for one row, collected in field order.
/// Most dimensions group by a handful of columns, so this stays inline.
pub type GroupValues = SmallVec<[model::SourceValue; 4]>;

// ============================================================================
// AGGREGATION
// ============================================================================

/// Supported aggregation functions for value fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregationType {
    Sum,
    Count,
    Average,
    Min,
    Max,
}

impl Default for AggregationType {
    fn default() -> Self {
        AggregationType::Sum
    }
}

// ============================================================================
// FIELD DEFINITIONS
// ============================================================================

/// A source column that gets aggregated into the materialized output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueField {
    /// Index of the source column (0-based).
    pub source_index: FieldIndex,

    /// Display name in the materialized dimension table.
    pub name: String,

    /// How to aggregate this column within a grouping cell.
    pub aggregation: AggregationType,
}

impl ValueField {
    pub fn new(source_index: FieldIndex, name: String, aggregation: AggregationType) -> Self {
        ValueField {
            source_index,
            name,
            aggregation,
        }
    }
}

// ============================================================================
// CONFIG
// ============================================================================

/// Host-supplied behavior switches.
///
/// `fill_gaps_with_previous_result` is read on every cache call that needs
/// it; the cache never stores a copy, so flipping it between calls takes
/// effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupConfig {
    /// When true, an empty grouping cell borrows the most recent prior
    /// non-empty cell's rows for the same group key (forward-fill).
    #[serde(default)]
    pub fill_gaps_with_previous_result: bool,

    /// How many otherwise-prunable buckets to keep as a trailing buffer.
    #[serde(default = "default_retention_buckets")]
    pub retention_buckets: usize,
}

fn default_retention_buckets() -> usize {
    3
}

impl Default for RollupConfig {
    fn default() -> Self {
        RollupConfig {
            fill_gaps_with_previous_result: false,
            retention_buckets: default_retention_buckets(),
        }
    }
}

// ============================================================================
// DEFINITION
// ============================================================================

/// Describes one rollup: the grouping schema, the aggregated columns, and
/// the time-bucket width.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupDefinition {
    /// Which dimension (grouping schema) this rollup belongs to.
    pub dimension: model::DimensionId,

    /// Display name.
    pub name: String,

    /// Width of each time bucket in milliseconds. Buckets are aligned to
    /// multiples of this width.
    pub bucket_width_ms: i64,

    /// Source columns whose values define the group key, in order.
    pub group_fields: Vec<FieldIndex>,

    /// Source columns that get aggregated per grouping cell.
    pub value_fields: Vec<ValueField>,
}

impl RollupDefinition {
    pub fn new(dimension: model::DimensionId, name: String, bucket_width_ms: i64) -> Self {
        RollupDefinition {
            dimension,
            name,
            bucket_width_ms,
            group_fields: Vec::new(),
            value_fields: Vec::new(),
        }
    }

    /// Returns the aligned `[start, end)` bucket containing `timestamp`.
    /// Uses euclidean division so pre-epoch timestamps still align to the
    /// bucket at or below them.
    pub fn bucket_bounds(&self, timestamp: Timestamp) -> Result<(Timestamp, Timestamp), RollupError> {
        if self.bucket_width_ms <= 0 {
            return Err(RollupError::InvalidBucketWidth(self.bucket_width_ms));
        }
        let start = timestamp.div_euclid(self.bucket_width_ms) * self.bucket_width_ms;
        Ok((start, start + self.bucket_width_ms))
    }

    /// Collects the row's grouping column values, in field order.
    pub fn group_values(&self, row: &SourceRow) -> Result<GroupValues, RollupError> {
        let mut values = GroupValues::new();
        for &field in &self.group_fields {
            match row.value_at(field) {
                Some(value) => values.push(value.clone()),
                None => {
                    return Err(RollupError::MissingGroupField {
                        row: row.id,
                        field,
                    })
                }
            }
        }
        Ok(values)
    }

    /// Derives the group key for a row.
    pub fn group_key(&self, row: &SourceRow) -> Result<GroupKey, RollupError> {
        Ok(GroupKey::of(self.group_values(row)?.iter()))
    }
}
