//! Dynamic cell values.
//!
//! Cell types are declared by the host, not by this core, so a cell value
//! is a small dynamic union rather than a generic parameter. Comparisons
//! for alarm thresholds go through [`CellValue::as_f64`]; non-numeric
//! values simply never satisfy a numeric bound.

use serde::{Deserialize, Serialize};

/// The current value of a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl CellValue {
    /// Numeric view of the value. `Bool` and `Text` have none.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(_) | Self::Text(_) => None,
        }
    }

    /// Boolean view of the value.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(_) | Self::Text(_) => None,
        }
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for CellValue {
    #[allow(clippy::cast_precision_loss)]
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl std::fmt::Display for CellValue {
    /// Message-friendly rendering: whole numbers print without a fraction,
    /// so an alarm reads "value = 7" rather than "value = 7.0".
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => b.fmt(f),
            Self::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 {
                    #[allow(clippy::cast_possible_truncation)]
                    let whole = *n as i64;
                    write!(f, "{whole}")
                } else {
                    n.fmt(f)
                }
            }
            Self::Text(s) => f.write_str(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_serialize_variants_untagged() {
        assert_eq!(
            serde_json::to_string(&CellValue::Bool(true)).unwrap(),
            "true"
        );
        assert_eq!(
            serde_json::to_string(&CellValue::Number(21.5)).unwrap(),
            "21.5"
        );
        assert_eq!(
            serde_json::to_string(&CellValue::Text("hi".to_string())).unwrap(),
            "\"hi\""
        );
    }

    #[test]
    fn should_deserialize_integer_as_number() {
        let v: CellValue = serde_json::from_str("5").unwrap();
        assert_eq!(v, CellValue::Number(5.0));
    }

    #[test]
    fn should_expose_numeric_view_only_for_numbers() {
        assert_eq!(CellValue::Number(3.5).as_f64(), Some(3.5));
        assert_eq!(CellValue::Bool(true).as_f64(), None);
        assert_eq!(CellValue::Text("3.5".to_string()).as_f64(), None);
    }

    #[test]
    fn should_display_whole_numbers_without_fraction() {
        assert_eq!(CellValue::Number(7.0).to_string(), "7");
        assert_eq!(CellValue::Number(7.25).to_string(), "7.25");
    }

    #[test]
    fn should_display_bool_and_text_plainly() {
        assert_eq!(CellValue::Bool(false).to_string(), "false");
        assert_eq!(CellValue::Text("open".to_string()).to_string(), "open");
    }

    #[test]
    fn should_compare_equal_values() {
        assert_eq!(CellValue::from(10), CellValue::Number(10.0));
        assert_ne!(CellValue::from(10), CellValue::from("10"));
    }
}
