//! FILENAME: model/src/value.rs
//! PURPOSE: Normalized, hashable representation of a source column value.
//! CONTEXT: Source rows arrive with heterogeneous column values. The rollup
//! subsystem needs to hash them (group-key derivation) and compare them
//! (change detection), so every value is normalized into `SourceValue`,
//! which implements `Eq` and `Hash` — including for floats, via
//! `OrderedFloat`.

use serde::{Deserialize, Serialize};

/// A normalized source column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceValue {
    Empty,
    Number(OrderedFloat),
    Text(String),
    Boolean(bool),
}

impl SourceValue {
    pub fn number(n: f64) -> Self {
        SourceValue::Number(OrderedFloat(n))
    }

    pub fn text(s: impl Into<String>) -> Self {
        SourceValue::Text(s.into())
    }

    /// Returns the numeric content, if this value is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            SourceValue::Number(n) => Some(n.0),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, SourceValue::Empty)
    }
}

/// Wrapper around f64 that implements Eq and Hash so values can be used as
/// map keys and hashed into group keys. NaN values compare equal to each
/// other and share one hash.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(pub f64);

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        if self.0.is_nan() && other.0.is_nan() {
            true
        } else {
            self.0 == other.0
        }
    }
}

impl Eq for OrderedFloat {}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        if self.0.is_nan() {
            u64::MAX.hash(state);
        } else {
            self.0.to_bits().hash(state);
        }
    }
}

impl OrderedFloat {
    pub fn as_f64(&self) -> f64 {
        self.0
    }
}
