//! Rule sink port: where normalized rules are handed off.

use crate::rules::NormalizedRule;

/// Accepts fully-normalized rules for trigger evaluation.
///
/// The engine's responsibility ends at producing the normalized rule
/// object; the sink owns matching triggers against live cell updates.
/// Registering a rule under an existing name replaces the previous rule;
/// same-name re-definition is a first-class operation, not an error.
pub trait RuleSink: Send + Sync {
    fn register(&self, rule: NormalizedRule);
}

impl<T: RuleSink> RuleSink for std::sync::Arc<T> {
    fn register(&self, rule: NormalizedRule) {
        (**self).register(rule);
    }
}
