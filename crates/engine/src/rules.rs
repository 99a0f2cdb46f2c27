//! Rule definition and normalization.
//!
//! A rule couples one trigger with one handler. Triggers come in four
//! shapes: `when` (level: the handler runs on every evaluation that yields
//! true), `asSoonAs` (edge: the handler runs only on the false→true
//! transition), `whenChanged` (a list of cell references, alias names or
//! value predicates), and cron (an opaque schedule string for the host's
//! scheduler).
//!
//! [`RuleEngine::define_rule`] validates the raw definition, wraps its
//! predicates for strict-completeness handling, resolves aliases, and hands
//! the fully-normalized rule to the [`RuleSink`]. Registering a rule under
//! an existing name replaces the previous rule.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, PoisonError};

use cellhub_domain::cell::CellRef;
use cellhub_domain::error::{CellHubError, DefinitionError};
use cellhub_domain::value::CellValue;
use tracing::debug;

use crate::cell_store::CellStore;
use crate::condition::{wrap_bool, wrap_value};
use crate::ports::RuleSink;

/// Boolean rule condition.
pub type BoolPredicate = Arc<dyn Fn() -> Result<bool, CellHubError> + Send + Sync>;

/// Value-producing `whenChanged` detector, as supplied by the rule author.
pub type ValuePredicate = Arc<dyn Fn() -> Result<CellValue, CellHubError> + Send + Sync>;

/// A wrapped value detector: `None` means "no observation this turn"
/// (an incomplete cell was read).
pub type WrappedValuePredicate =
    Arc<dyn Fn() -> Result<Option<CellValue>, CellHubError> + Send + Sync>;

/// Rule body. Receives the trigger payload when one is available.
pub type Handler = Arc<dyn Fn(Option<&TriggerPayload>) + Send + Sync>;

/// Normalized argument shape for rule handlers: the new value, plus the
/// originating cell when the trigger came from a concrete cell rather than
/// a computed detector.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerPayload {
    pub value: CellValue,
    pub cell: Option<CellRef>,
}

/// A raw rule definition, as built by [`RuleDef::builder`].
pub struct RuleDef {
    when: Option<BoolPredicate>,
    as_soon_as: Option<BoolPredicate>,
    when_changed: Vec<ChangeItem>,
    cron: Option<String>,
    then: Handler,
    readonly: bool,
}

enum ChangeItem {
    /// A literal `"device/control"` reference or an alias name; which one
    /// is decided at definition time.
    Ref(String),
    Value(ValuePredicate),
}

impl RuleDef {
    /// Create a builder for constructing a [`RuleDef`].
    #[must_use]
    pub fn builder() -> RuleDefBuilder {
        RuleDefBuilder::default()
    }
}

/// Step-by-step builder for [`RuleDef`].
#[derive(Default)]
pub struct RuleDefBuilder {
    when: Option<BoolPredicate>,
    as_soon_as: Option<BoolPredicate>,
    when_changed: Vec<ChangeItem>,
    cron: Option<String>,
    then: Option<Handler>,
    readonly: Option<bool>,
}

impl RuleDefBuilder {
    /// Level-triggered condition: the handler runs on every evaluation
    /// that yields true.
    #[must_use]
    pub fn when<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> Result<bool, CellHubError> + Send + Sync + 'static,
    {
        self.when = Some(Arc::new(predicate));
        self
    }

    /// Edge-triggered condition: the handler runs only on the false→true
    /// transition.
    #[must_use]
    pub fn as_soon_as<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> Result<bool, CellHubError> + Send + Sync + 'static,
    {
        self.as_soon_as = Some(Arc::new(predicate));
        self
    }

    /// Cron trigger. The spec string is handed opaquely to the host's
    /// scheduler; cron rules carry no predicate.
    #[must_use]
    pub fn when_cron(mut self, spec: impl Into<String>) -> Self {
        self.cron = Some(spec.into());
        self
    }

    /// Watch a cell for changes, by literal `"device/control"` reference
    /// or by alias name. May be called repeatedly to watch several items.
    #[must_use]
    pub fn when_changed(mut self, reference: impl Into<String>) -> Self {
        self.when_changed.push(ChangeItem::Ref(reference.into()));
        self
    }

    /// Watch a computed value for changes.
    #[must_use]
    pub fn when_changed_value<F>(mut self, predicate: F) -> Self
    where
        F: Fn() -> Result<CellValue, CellHubError> + Send + Sync + 'static,
    {
        self.when_changed.push(ChangeItem::Value(Arc::new(predicate)));
        self
    }

    /// The rule body.
    #[must_use]
    pub fn then<F>(mut self, handler: F) -> Self
    where
        F: Fn(Option<&TriggerPayload>) + Send + Sync + 'static,
    {
        self.then = Some(Arc::new(handler));
        self
    }

    /// Mark the rule read-only for the host's schema. Always a concrete
    /// boolean on the normalized rule.
    #[must_use]
    pub fn readonly(mut self, readonly: bool) -> Self {
        self.readonly = Some(readonly);
        self
    }

    /// Consume the builder, validate, and return a [`RuleDef`].
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the definition has no handler,
    /// carries an empty cron spec, or does not have exactly one trigger.
    pub fn build(self) -> Result<RuleDef, CellHubError> {
        if let Some(spec) = &self.cron {
            if spec.trim().is_empty() {
                return Err(DefinitionError::InvalidCronSpec(spec.clone()).into());
            }
        }
        let triggers = usize::from(self.when.is_some())
            + usize::from(self.as_soon_as.is_some())
            + usize::from(self.cron.is_some())
            + usize::from(!self.when_changed.is_empty());
        if triggers != 1 {
            return Err(DefinitionError::TriggerCount.into());
        }
        let then = self.then.ok_or(DefinitionError::MissingHandler)?;
        Ok(RuleDef {
            when: self.when,
            as_soon_as: self.as_soon_as,
            when_changed: self.when_changed,
            cron: self.cron,
            then,
            readonly: self.readonly.unwrap_or(false),
        })
    }
}

/// A fully-normalized rule, ready for the host dispatcher.
#[derive(Clone)]
pub struct NormalizedRule {
    pub name: String,
    pub trigger: NormalizedTrigger,
    pub handler: Handler,
    pub readonly: bool,
}

/// The trigger after normalization: predicates wrapped for
/// strict-completeness handling, aliases resolved, cron split out.
#[derive(Clone)]
pub enum NormalizedTrigger {
    /// `when`: fires on every true evaluation.
    Level(BoolPredicate),
    /// `asSoonAs`: fires on the false→true edge only.
    Edge(BoolPredicate),
    /// `whenChanged`: fires when a watched cell changes or a watched
    /// computed value differs from its previous observation.
    Changed(Vec<ChangeWatch>),
    /// Cron schedule, carried opaquely.
    Cron(String),
}

/// One normalized `whenChanged` item.
#[derive(Clone)]
pub enum ChangeWatch {
    Cell(CellRef),
    Value(WrappedValuePredicate),
}

/// Registers rules and aliases, normalizing definitions for the host.
pub struct RuleEngine {
    store: Arc<CellStore>,
    sink: Arc<dyn RuleSink>,
    aliases: Mutex<HashMap<String, CellRef>>,
}

impl RuleEngine {
    #[must_use]
    pub fn new(store: Arc<CellStore>, sink: Arc<dyn RuleSink>) -> Self {
        Self {
            store,
            sink,
            aliases: Mutex::new(HashMap::new()),
        }
    }

    /// The cell store this engine evaluates against.
    #[must_use]
    pub fn store(&self) -> &Arc<CellStore> {
        &self.store
    }

    /// Bind `name` to a cell reference, permanently.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] when the name is empty or looks like a
    /// cell reference, when the reference is malformed, or when the alias
    /// is already defined; an alias, once bound, must keep resolving to
    /// the same cell for the remainder of the process lifetime.
    pub fn define_alias(&self, name: &str, reference: &str) -> Result<(), CellHubError> {
        if name.is_empty() || name.contains('/') {
            return Err(DefinitionError::InvalidAlias(name.to_string()).into());
        }
        let cell: CellRef = reference.parse().map_err(CellHubError::from)?;
        let mut aliases = self.aliases.lock().unwrap_or_else(PoisonError::into_inner);
        match aliases.entry(name.to_string()) {
            Entry::Occupied(_) => {
                Err(DefinitionError::AliasRedefined(name.to_string()).into())
            }
            Entry::Vacant(slot) => {
                slot.insert(cell);
                Ok(())
            }
        }
    }

    /// Resolve a name that is either a literal `"device/control"`
    /// reference or a previously-defined alias.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for a malformed literal reference or
    /// an unknown alias.
    pub fn resolve(&self, name: &str) -> Result<CellRef, CellHubError> {
        if name.contains('/') {
            return name.parse().map_err(CellHubError::from);
        }
        let aliases = self.aliases.lock().unwrap_or_else(PoisonError::into_inner);
        aliases
            .get(name)
            .cloned()
            .ok_or_else(|| DefinitionError::UnknownAlias(name.to_string()).into())
    }

    /// Read a cell by literal reference or alias.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for an unresolvable name, or the
    /// incomplete-cell signal under strict-completeness mode.
    pub fn read(&self, name: &str) -> Result<CellValue, CellHubError> {
        self.store.read(&self.resolve(name)?)
    }

    /// Write a cell by literal reference or alias.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for an unresolvable name.
    pub fn write(&self, name: &str, value: CellValue) -> Result<(), CellHubError> {
        self.store.write(&self.resolve(name)?, value);
        Ok(())
    }

    /// Normalize `def` and register it under `name`, replacing any prior
    /// rule of that name.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for an empty name or an unresolvable
    /// `whenChanged` item. A failed definition registers nothing and leaves
    /// previously-registered rules untouched.
    pub fn define_rule(&self, name: &str, def: RuleDef) -> Result<(), CellHubError> {
        if name.is_empty() {
            return Err(DefinitionError::EmptyRuleName.into());
        }
        debug!(rule = name, "defining rule");

        let strict = self.store.strict();
        let trigger = if let Some(spec) = def.cron {
            NormalizedTrigger::Cron(spec)
        } else if let Some(predicate) = def.when {
            NormalizedTrigger::Level(wrap_bool(Arc::clone(&strict), name.to_string(), predicate))
        } else if let Some(predicate) = def.as_soon_as {
            NormalizedTrigger::Edge(wrap_bool(Arc::clone(&strict), name.to_string(), predicate))
        } else {
            let watches = def
                .when_changed
                .into_iter()
                .map(|item| match item {
                    ChangeItem::Ref(reference) => {
                        self.resolve(&reference).map(ChangeWatch::Cell)
                    }
                    ChangeItem::Value(predicate) => Ok(ChangeWatch::Value(wrap_value(
                        Arc::clone(&strict),
                        name.to_string(),
                        predicate,
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?;
            NormalizedTrigger::Changed(watches)
        };

        self.sink.register(NormalizedRule {
            name: name.to_string(),
            trigger,
            handler: def.then,
            readonly: def.readonly,
        });
        Ok(())
    }
}
