//! FILENAME: model/src/lib.rs
//! PURPOSE: Main library entry point for the shared data model.
//! CONTEXT: Re-exports the value, row, and key types used by the rollup
//! subsystem and by anything that feeds source rows into it.

pub mod key;
pub mod row;
pub mod value;

// Re-export commonly used types at the crate root
pub use key::{DimensionId, FieldIndex, GroupKey, Timestamp};
pub use row::{RowId, SourceRow};
pub use value::{OrderedFloat, SourceValue};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_builds_rows_and_keys() {
        let row = SourceRow::new(
            7,
            vec![
                SourceValue::text("EMEA"),
                SourceValue::text("Gadget"),
                SourceValue::number(12.5),
            ],
        );

        assert_eq!(row.id, 7);
        assert_eq!(row.value_at(0), Some(&SourceValue::text("EMEA")));
        assert_eq!(row.value_at(3), None);

        let key = GroupKey::of(row.values[..2].iter());
        let same = GroupKey::of(row.values[..2].iter());
        assert_eq!(key, same);
    }

    #[test]
    fn integration_test_row_value_equality() {
        let a = SourceRow::new(1, vec![SourceValue::number(1.0)]);
        let b = SourceRow::new(1, vec![SourceValue::number(1.0)]);
        let c = SourceRow::new(1, vec![SourceValue::number(2.0)]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
