//! FILENAME: rollup-engine/src/materialize.rs
//! PURPOSE: The consumer loop — turns dirty cells into dimension table rows.
//! CONTEXT: This is the driver the host runs periodically. It drains the
//! grid's dirty blocks, resolves each cell's effective rows (which may be
//! borrowed from an earlier bucket via fill-gap), aggregates them per the
//! rollup definition, writes the result into the dimension table, and stores
//! the resulting output reference back into the cell. The fill-gap flag is
//! read from the config at every call, never cached.

use model::{SourceRow, SourceValue, Timestamp};

use crate::cache::{BucketGrid, CellKey, RowChange};
use crate::definition::{AggregationType, GroupValues, RollupConfig, RollupDefinition};
use crate::error::RollupError;
use crate::table::{DimensionRow, DimensionTable};

// ============================================================================
// AGGREGATE ACCUMULATOR
// ============================================================================

/// Accumulator for one value field over one cell's effective rows.
#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    sum: f64,
    count: u64,
    count_numbers: u64,
    min: Option<f64>,
    max: Option<f64>,
}

impl Accumulator {
    fn add(&mut self, value: Option<&SourceValue>) {
        let Some(value) = value else { return };
        if value.is_empty() {
            return;
        }
        self.count += 1;
        if let Some(n) = value.as_number() {
            self.count_numbers += 1;
            self.sum += n;
            self.min = Some(self.min.map_or(n, |m| m.min(n)));
            self.max = Some(self.max.map_or(n, |m| m.max(n)));
        }
    }

    fn compute(&self, aggregation: AggregationType) -> f64 {
        match aggregation {
            AggregationType::Sum => self.sum,
            AggregationType::Count => self.count as f64,
            AggregationType::Average => {
                if self.count_numbers > 0 {
                    self.sum / (self.count_numbers as f64)
                } else {
                    0.0
                }
            }
            AggregationType::Min => self.min.unwrap_or(0.0),
            AggregationType::Max => self.max.unwrap_or(0.0),
        }
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Counters from one materialization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    /// Dirty cells consumed from the grid.
    pub cells_processed: usize,
    /// Dimension rows written for cells that had no output yet.
    pub rows_inserted: usize,
    /// Dimension rows overwritten behind an existing output reference.
    pub rows_replaced: usize,
}

/// Ingestion front door: aligns the timestamp to the definition's bucket
/// width, derives the group key from the row's grouping columns, and feeds
/// the grid.
pub fn ingest_row(
    grid: &mut BucketGrid,
    definition: &RollupDefinition,
    config: &RollupConfig,
    timestamp: Timestamp,
    row: SourceRow,
) -> Result<RowChange, RollupError> {
    let (bucket_start, bucket_end) = definition.bucket_bounds(timestamp)?;
    let group_key = definition.group_key(&row)?;
    grid.add_row(
        definition.dimension,
        bucket_start,
        bucket_end,
        group_key,
        row,
        config.fill_gaps_with_previous_result,
    )
}

/// Drains one full dirty-block pass and materializes every yielded cell.
///
/// The pass's cell handles are collected up front; re-dirtying only ever
/// happens through ingestion, never through materialization itself, so this
/// observes the same cells as a strictly interleaved drain would.
pub fn materialize_dirty(
    definition: &RollupDefinition,
    config: &RollupConfig,
    grid: &mut BucketGrid,
    table: &mut DimensionTable,
) -> MaterializeStats {
    let fill_gap = config.fill_gaps_with_previous_result;
    let mut stats = MaterializeStats::default();

    let keys: Vec<CellKey> = grid.dirty_blocks(true).collect();
    for key in keys {
        let Some(bucket) = grid.bucket(key.bucket_start) else {
            continue;
        };
        let bucket_end = bucket.bucket_end();
        let dimension = bucket.dimension();

        let Some(source) = grid.effective_cell(key.bucket_start, key.group_key, fill_gap) else {
            continue;
        };
        let source_bucket_start = source.bucket_start();

        let mut accumulators = vec![Accumulator::default(); definition.value_fields.len()];
        let mut group_values = GroupValues::new();
        for row in source.rows() {
            if group_values.is_empty() {
                if let Ok(values) = definition.group_values(row) {
                    group_values = values;
                }
            }
            for (accumulator, field) in accumulators.iter_mut().zip(&definition.value_fields) {
                accumulator.add(row.value_at(field.source_index));
            }
        }
        let values: Vec<f64> = accumulators
            .iter()
            .zip(&definition.value_fields)
            .map(|(accumulator, field)| accumulator.compute(field.aggregation))
            .collect();

        let out_row = DimensionRow {
            dimension,
            bucket_start: key.bucket_start,
            bucket_end,
            group_key: key.group_key,
            group_values,
            values,
            source_bucket_start,
        };

        let previous = grid.cell(key).and_then(|cell| cell.output_ref());
        let output_ref = match previous {
            Some(existing) => {
                if table.replace(existing, out_row) {
                    stats.rows_replaced += 1;
                } else {
                    stats.rows_inserted += 1;
                }
                existing
            }
            None => {
                stats.rows_inserted += 1;
                table.insert(out_row)
            }
        };
        if let Some(cell) = grid.cell_mut(key) {
            cell.set_output_ref(output_ref);
        }
        stats.cells_processed += 1;
    }
    stats
}

/// One full maintenance cycle: prune what the previous cycles made
/// reclaimable, then materialize everything currently dirty.
///
/// Pruning runs first because it needs a still-dirty bucket to anchor its
/// safety threshold; after a full drain there is nothing dirty and nothing
/// would ever be reclaimed.
pub fn run_cycle(
    definition: &RollupDefinition,
    config: &RollupConfig,
    grid: &mut BucketGrid,
    table: &mut DimensionTable,
) -> (MaterializeStats, Vec<Timestamp>) {
    let removed = grid.prune_old_buckets(
        config.retention_buckets,
        config.fill_gaps_with_previous_result,
    );
    let stats = materialize_dirty(definition, config, grid, table);
    (stats, removed)
}
