//! Condition wrapping: strict-completeness mode for rule predicates.
//!
//! Rule predicates must not fire on incomplete data: while a predicate
//! runs, any read of a cell the host has not populated yet returns the
//! distinguished [`CellHubError::IncompleteCell`] variant instead of a
//! placeholder value. The wrappers here turn that one variant into the
//! rule-specific "skip" result (`false` for boolean conditions, `None` for
//! value-change detectors) and let every other error propagate unchanged.
//!
//! Strict mode is a process-wide reentrant counter: nested predicate
//! evaluation increments and decrements it correctly, and the RAII guard
//! restores it on every exit path, including the short-circuit case.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use cellhub_domain::error::CellHubError;
use tracing::debug;

use crate::rules::{BoolPredicate, ValuePredicate, WrappedValuePredicate};

/// Reentrant strict-completeness counter, starting at zero.
#[derive(Debug, Default)]
pub struct StrictDepth(AtomicUsize);

impl StrictDepth {
    /// Enter strict mode for the lifetime of the returned guard.
    #[must_use]
    pub fn enter(self: &Arc<Self>) -> StrictGuard {
        self.0.fetch_add(1, Ordering::Relaxed);
        StrictGuard {
            depth: Arc::clone(self),
        }
    }

    /// Whether any predicate evaluation is currently in progress.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.0.load(Ordering::Relaxed) > 0
    }
}

/// Scoped acquire/release of strict mode.
pub struct StrictGuard {
    depth: Arc<StrictDepth>,
}

impl Drop for StrictGuard {
    fn drop(&mut self) {
        self.depth.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Wrap a boolean condition (`when` / `asSoonAs`): an incomplete cell read
/// makes the condition evaluate to `false` instead of failing.
pub(crate) fn wrap_bool(
    strict: Arc<StrictDepth>,
    rule: String,
    predicate: BoolPredicate,
) -> BoolPredicate {
    Arc::new(move || {
        let _guard = strict.enter();
        match predicate() {
            Err(CellHubError::IncompleteCell { cell }) => {
                debug!(rule = %rule, cell = %cell, "skipping rule due to incomplete cell");
                Ok(false)
            }
            other => other,
        }
    })
}

/// Wrap a value-change detector (`whenChanged` predicate item): an
/// incomplete cell read yields `None`; no completeness coercion, the
/// detector simply has no observation for this turn.
pub(crate) fn wrap_value(
    strict: Arc<StrictDepth>,
    rule: String,
    predicate: ValuePredicate,
) -> WrappedValuePredicate {
    Arc::new(move || {
        let _guard = strict.enter();
        match predicate() {
            Ok(value) => Ok(Some(value)),
            Err(CellHubError::IncompleteCell { cell }) => {
                debug!(rule = %rule, cell = %cell, "skipping rule due to incomplete cell");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    })
}
