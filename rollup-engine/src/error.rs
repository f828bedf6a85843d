//! FILENAME: rollup-engine/src/error.rs

use model::{FieldIndex, RowId, Timestamp};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RollupError {
    #[error("invalid bucket range: start {start} is not before end {end}")]
    InvalidBucketRange { start: Timestamp, end: Timestamp },

    #[error("bucket at {start} has end {existing}, caller supplied {supplied}")]
    BucketBoundsMismatch {
        start: Timestamp,
        existing: Timestamp,
        supplied: Timestamp,
    },

    #[error("invalid bucket width: {0} (must be positive)")]
    InvalidBucketWidth(i64),

    #[error("row {row} has no value for grouping column {field}")]
    MissingGroupField { row: RowId, field: FieldIndex },
}
