//! Cell references: `"device/control"`.
//!
//! A cell is a single named point of automation state under a device.
//! References use exactly one `/` separating two non-empty segments;
//! anything else is a definition-time error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;

/// A parsed reference to a cell: `(device, control)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellRef {
    device: String,
    control: String,
}

impl CellRef {
    /// Build a reference from already-separated parts.
    ///
    /// # Errors
    ///
    /// Returns [`DefinitionError::MalformedCellRef`] when either part is
    /// empty or contains a `/`.
    pub fn new(
        device: impl Into<String>,
        control: impl Into<String>,
    ) -> Result<Self, DefinitionError> {
        let device = device.into();
        let control = control.into();
        if device.is_empty()
            || control.is_empty()
            || device.contains('/')
            || control.contains('/')
        {
            return Err(DefinitionError::MalformedCellRef(format!(
                "{device}/{control}"
            )));
        }
        Ok(Self { device, control })
    }

    /// The device segment.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// The control segment.
    #[must_use]
    pub fn control(&self) -> &str {
        &self.control
    }

    /// Whether this reference points at the given `(device, control)` pair.
    #[must_use]
    pub fn points_at(&self, device: &str, control: &str) -> bool {
        self.device == device && self.control == control
    }
}

impl FromStr for CellRef {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((device, control)) => Self::new(device, control)
                .map_err(|_| DefinitionError::MalformedCellRef(s.to_string())),
            None => Err(DefinitionError::MalformedCellRef(s.to_string())),
        }
    }
}

impl TryFrom<String> for CellRef {
    type Error = DefinitionError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<CellRef> for String {
    fn from(cell: CellRef) -> Self {
        cell.to_string()
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.control)
    }
}
