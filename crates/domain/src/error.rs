//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts via `#[from]`.
//! The one unusual citizen is [`CellHubError::IncompleteCell`]: it is not a
//! failure but a control-flow signal raised when a rule predicate reads a
//! cell the host has not populated yet. The condition wrapper in the engine
//! crate matches on that variant specifically and converts it into the
//! rule-specific "skip" value; it must never escape rule evaluation.

use crate::cell::CellRef;

/// Top-level error type for the rule-evaluation core.
#[derive(Debug, thiserror::Error)]
pub enum CellHubError {
    /// An invalid rule, alias, or alarm specification. Fatal at load time.
    #[error("definition error")]
    Definition(#[from] DefinitionError),

    /// A strict-completeness read hit a cell with no host-supplied value.
    #[error("incomplete cell encountered: {cell}")]
    IncompleteCell { cell: CellRef },

    /// The external structured-config reader failed.
    #[error("config error")]
    Config(#[from] ConfigError),
}

/// Load-time specification errors. Aborting the offending definition must
/// not corrupt previously-loaded rules.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("invalid cell reference: {0:?}")]
    MalformedCellRef(String),

    #[error("rule name must not be empty")]
    EmptyRuleName,

    #[error("rule must have exactly one trigger (when, asSoonAs, whenChanged or cron)")]
    TriggerCount,

    #[error("rule has no handler")]
    MissingHandler,

    #[error("invalid cron spec: {0:?}")]
    InvalidCronSpec(String),

    #[error("invalid alias definition: {0:?}")]
    InvalidAlias(String),

    #[error("alias {0:?} is already defined")]
    AliasRedefined(String),

    #[error("unknown cell alias in whenChanged: {0:?}")]
    UnknownAlias(String),

    #[error("alarm for {cell}: cannot have both expectedValue and minValue/maxValue")]
    ConflictingAlarmBounds { cell: CellRef },

    #[error("alarm for {cell}: must specify either expectedValue or a value range")]
    MissingAlarmBounds { cell: CellRef },

    #[error("alarm for {cell}: interval must be a strictly positive number of seconds")]
    InvalidAlarmInterval { cell: CellRef },

    #[error("no (proper) recipients specified")]
    NoRecipients,

    #[error("no (proper) alarms specified")]
    NoAlarms,

    #[error("invalid alarm configuration: {0}")]
    InvalidAlarmConfig(#[from] serde_json::Error),
}

/// Failures while resolving an external-config reference.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file")]
    Io(#[from] std::io::Error),

    #[error("malformed config file")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn should_name_offending_cell_in_incomplete_signal() {
        let err = CellHubError::IncompleteCell {
            cell: CellRef::from_str("boiler/temperature").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "incomplete cell encountered: boiler/temperature"
        );
    }

    #[test]
    fn should_convert_definition_error_via_from() {
        let err: CellHubError = DefinitionError::EmptyRuleName.into();
        assert!(matches!(
            err,
            CellHubError::Definition(DefinitionError::EmptyRuleName)
        ));
    }

    #[test]
    fn should_mention_alias_name_in_redefinition_error() {
        let err = DefinitionError::AliasRedefined("motionSensor".to_string());
        assert!(err.to_string().contains("motionSensor"));
    }
}
