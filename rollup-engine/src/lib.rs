//! FILENAME: rollup-engine/src/lib.rs
//! Time-bucketed incremental rollup subsystem.
//!
//! This crate accumulates source rows into a two-dimensional grid of
//! (time bucket x group key) cells, tracks which cells have unconsumed
//! changes, resolves empty cells by borrowing the most recent prior result
//! (fill-gap), and periodically evicts old buckets while guaranteeing that
//! any bucket still needed as a fill-gap source is retained. It depends on
//! `model` only for shared types (SourceRow, SourceValue, GroupKey).
//!
//! Layers:
//! - `definition`: Serializable configuration (what the rollup IS)
//! - `cache`: High-performance internal representation (HOW we track)
//! - `table`: Materialized output for the host (WHAT we produce)
//! - `materialize`: Consumer loop (HOW we produce it)
//!
//! The whole structure is single-threaded and synchronous; every mutation
//! takes `&mut` on the grid, so a concurrent host must put it behind one
//! writer (dirty-clearing and cascade propagation are not idempotent under
//! interleaving).

pub mod cache;
pub mod definition;
pub mod error;
pub mod materialize;
pub mod table;

pub use cache::{BucketGrid, CellKey, DirtyBlocks, GroupCell, RowChange, TimeBucket};
pub use definition::{
    AggregationType, GroupValues, RollupConfig, RollupDefinition, ValueField,
};
pub use error::RollupError;
pub use materialize::{ingest_row, materialize_dirty, run_cycle, MaterializeStats};
pub use table::{DimensionRow, DimensionTable, OutputRef};
