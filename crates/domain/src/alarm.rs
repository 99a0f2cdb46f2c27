//! Alarm configuration: the external config surface of the alarm monitor.
//!
//! An alarm watches one cell against either an expected value or a
//! `[min, max]` range, and notifies a list of recipients when the cell
//! leaves bounds (with optional periodic re-notification) and again when
//! it returns to normal.
//!
//! Raw specifications deserialize from JSON as the host provides them and
//! are validated field by field into an [`AlarmPlan`] before any rule gets
//! registered: a bad entry anywhere in the file registers nothing.

use std::time::Duration;

use serde::Deserialize;

use crate::cell::CellRef;
use crate::error::DefinitionError;
use crate::value::CellValue;

/// A whole alarm configuration file: who to notify, and what to watch.
#[derive(Debug, Clone, Deserialize)]
pub struct AlarmsConfig {
    pub recipients: Vec<RecipientSpec>,
    pub alarms: Vec<AlarmSpec>,
}

/// A notification recipient, dispatched on its `type` tag.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecipientSpec {
    /// Mail-submission recipient. The optional subject is a template where
    /// `{}` is replaced with the notification text.
    Email {
        to: String,
        subject: Option<String>,
    },
    /// SMS recipient. SMS sends share one outbound FIFO queue per process.
    Sms { to: String },
}

/// One raw alarm entry, field names as they appear in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlarmSpec {
    pub cell: CellRef,
    pub expected_value: Option<CellValue>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    /// Re-notification period while active, in seconds.
    pub interval: Option<f64>,
    pub alarm_message: Option<String>,
    pub no_alarm_message: Option<String>,
}

/// The monitored condition, reduced to one of its two legal shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum AlarmCondition {
    /// Active while the cell value differs from the expected one.
    Expected(CellValue),
    /// Active while the numeric value lies outside `[min, max]`. A bound
    /// left out of the spec defaults to the corresponding infinity.
    Range { min: f64, max: f64 },
}

impl AlarmCondition {
    /// Out-of-bounds test. Non-numeric values never breach a range.
    #[must_use]
    pub fn is_breached(&self, value: &CellValue) -> bool {
        match self {
            Self::Expected(expected) => value != expected,
            Self::Range { min, max } => value
                .as_f64()
                .is_some_and(|v| v < *min || v > *max),
        }
    }

    /// In-bounds test. Deliberately not the negation of [`is_breached`]:
    /// a non-numeric value satisfies neither test, so it can neither raise
    /// nor clear a range alarm.
    ///
    /// [`is_breached`]: Self::is_breached
    #[must_use]
    pub fn is_satisfied(&self, value: &CellValue) -> bool {
        match self {
            Self::Expected(expected) => value == expected,
            Self::Range { min, max } => value
                .as_f64()
                .is_some_and(|v| v >= *min && v <= *max),
        }
    }
}

/// A validated alarm, ready for the monitor to register rules from.
#[derive(Debug, Clone)]
pub struct AlarmPlan {
    pub cell: CellRef,
    pub condition: AlarmCondition,
    /// Re-notification period while active.
    pub interval: Option<Duration>,
    alarm_message: String,
    no_alarm_message: String,
}

impl AlarmPlan {
    /// Render the activation message with the current cell value.
    #[must_use]
    pub fn alarm_message(&self, value: &CellValue) -> String {
        fill_placeholder(&self.alarm_message, &value.to_string())
    }

    /// Render the recovery message with the current cell value.
    #[must_use]
    pub fn recovery_message(&self, value: &CellValue) -> String {
        fill_placeholder(&self.no_alarm_message, &value.to_string())
    }
}

/// Substitute the first `{}` in `template` with `arg`. Templates without a
/// placeholder pass through unchanged.
#[must_use]
pub fn fill_placeholder(template: &str, arg: &str) -> String {
    template.replacen("{}", arg, 1)
}

impl AlarmSpec {
    /// Check domain invariants and reduce the raw entry to an [`AlarmPlan`].
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the entry carries both an expected
    /// value and a range bound, neither, or a non-positive interval.
    pub fn check(&self) -> Result<AlarmPlan, DefinitionError> {
        let has_range = self.min_value.is_some() || self.max_value.is_some();
        let condition = match (&self.expected_value, has_range) {
            (Some(_), true) => {
                return Err(DefinitionError::ConflictingAlarmBounds {
                    cell: self.cell.clone(),
                });
            }
            (None, false) => {
                return Err(DefinitionError::MissingAlarmBounds {
                    cell: self.cell.clone(),
                });
            }
            (Some(expected), false) => AlarmCondition::Expected(expected.clone()),
            (None, true) => AlarmCondition::Range {
                min: self.min_value.unwrap_or(f64::NEG_INFINITY),
                max: self.max_value.unwrap_or(f64::INFINITY),
            },
        };

        let interval = match self.interval {
            None => None,
            // The NaN case fails the > 0.0 test as well.
            Some(seconds) if seconds > 0.0 && seconds.is_finite() => {
                Some(Duration::from_secs_f64(seconds))
            }
            Some(_) => {
                return Err(DefinitionError::InvalidAlarmInterval {
                    cell: self.cell.clone(),
                });
            }
        };

        let alarm_message = self.alarm_message.clone().unwrap_or_else(|| {
            if self.expected_value.is_some() {
                format!("{} has unexpected value = {{}}", self.cell)
            } else {
                format!("{} is out of bounds, value = {{}}", self.cell)
            }
        });
        let no_alarm_message = self
            .no_alarm_message
            .clone()
            .unwrap_or_else(|| format!("{} is back to normal, value = {{}}", self.cell));

        Ok(AlarmPlan {
            cell: self.cell.clone(),
            condition,
            interval,
            alarm_message,
            no_alarm_message,
        })
    }
}

impl AlarmsConfig {
    /// Validate the whole file: non-empty recipient and alarm lists, and
    /// every alarm entry well-formed.
    ///
    /// # Errors
    ///
    /// Returns the first [`DefinitionError`] found; callers must register
    /// nothing in that case.
    pub fn validate(&self) -> Result<Vec<AlarmPlan>, DefinitionError> {
        if self.recipients.is_empty() {
            return Err(DefinitionError::NoRecipients);
        }
        if self.alarms.is_empty() {
            return Err(DefinitionError::NoAlarms);
        }
        self.alarms.iter().map(AlarmSpec::check).collect()
    }
}
