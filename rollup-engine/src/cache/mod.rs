//! Time-bucketed grouping cache.
//!
//! Three nested layers, each a thin wrapper over the previous:
//! - `cell`: row set for one (time bucket, group key) pair, plus dirty flag
//! - `bucket`: group key -> cell map for one time interval, plus dirty hint
//! - `grid`: ordered bucket-start -> bucket map; ingestion, fill-gap
//!   resolution, and retention pruning all enter here
//! - `dirty`: the two-level dirty-block enumeration protocol
//!
//! Cross-references (sibling lookup, parent-dirty notification) are
//! key-based lookups through the grid, never stored pointers, so the whole
//! working set lives in flat maps owned by the grid.

pub mod bucket;
pub mod cell;
pub mod dirty;
pub mod grid;

pub use bucket::TimeBucket;
pub use cell::{GroupCell, RowChange};
pub use dirty::DirtyBlocks;
pub use grid::{BucketGrid, CellKey};
