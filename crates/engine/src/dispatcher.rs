//! In-process rule dispatcher.
//!
//! Holds registered rules and evaluates them when a cell reports a change
//! or a cron entry comes due. Edge triggers remember the previous truth
//! value per rule so they fire exactly once per false→true transition;
//! level triggers fire on every evaluation that yields true.

use std::sync::{Arc, Mutex, PoisonError};

use cellhub_domain::value::CellValue;
use tracing::error;

use crate::ports::RuleSink;
use crate::rules::{ChangeWatch, NormalizedRule, NormalizedTrigger, TriggerPayload};

/// Dispatch state for one registered rule.
struct ActiveRule {
    rule: NormalizedRule,
    /// Previous truth value for edge triggers. `None` until the first
    /// evaluation; a first evaluation that yields true counts as an edge.
    last_truth: Option<bool>,
    /// Previous observations for value watches, indexed like the watch
    /// list. `None` until the watch produces its first value.
    last_values: Vec<Option<CellValue>>,
}

impl ActiveRule {
    fn new(rule: NormalizedRule) -> Self {
        let watches = match &rule.trigger {
            NormalizedTrigger::Changed(watches) => watches.len(),
            _ => 0,
        };
        Self {
            rule,
            last_truth: None,
            last_values: vec![None; watches],
        }
    }
}

/// Evaluates registered rules against incoming cell changes and cron
/// ticks. Handlers run outside the internal lock, so a handler may define
/// further rules without deadlocking.
#[derive(Default)]
pub struct RuleDispatcher {
    rules: Mutex<Vec<ActiveRule>>,
}

impl RuleSink for RuleDispatcher {
    fn register(&self, rule: NormalizedRule) {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        match rules.iter_mut().find(|active| active.rule.name == rule.name) {
            Some(existing) => *existing = ActiveRule::new(rule),
            None => rules.push(ActiveRule::new(rule)),
        }
    }
}

impl RuleDispatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the currently registered rules, in registration order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<String> {
        let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        rules.iter().map(|active| active.rule.name.clone()).collect()
    }

    /// React to a cell change. Every registered rule is re-evaluated;
    /// `whenChanged` cell watches additionally require the changed cell to
    /// be one of their watched cells. Returns the names of the rules whose
    /// handler fired.
    pub fn cell_changed(&self, device: &str, control: &str, value: &CellValue) -> Vec<String> {
        let mut fired = Vec::new();
        let count = {
            let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
            rules.len()
        };
        // Rules are taken by index, one at a time, and evaluated with the
        // lock released. Handlers may register rules; anything appended
        // during this pass is picked up on the next change.
        for index in 0..count {
            let Some((name, trigger, handler)) = self.snapshot(index) else {
                continue;
            };
            match trigger {
                NormalizedTrigger::Level(predicate) => match predicate() {
                    Ok(true) => {
                        handler(None);
                        fired.push(name);
                    }
                    Ok(false) => {}
                    Err(err) => error!(rule = %name, error = %err, "rule condition failed"),
                },
                NormalizedTrigger::Edge(predicate) => match predicate() {
                    Ok(truth) => {
                        let rose = self.record_truth(&name, truth);
                        if rose {
                            handler(None);
                            fired.push(name);
                        }
                    }
                    Err(err) => error!(rule = %name, error = %err, "rule condition failed"),
                },
                NormalizedTrigger::Changed(watches) => {
                    let mut payload = None;
                    for (slot, watch) in watches.iter().enumerate() {
                        match watch {
                            ChangeWatch::Cell(cell) => {
                                if cell.points_at(device, control) {
                                    payload = Some(TriggerPayload {
                                        value: value.clone(),
                                        cell: Some(cell.clone()),
                                    });
                                    break;
                                }
                            }
                            ChangeWatch::Value(predicate) => match predicate() {
                                Ok(Some(observed)) => {
                                    if self.record_value(&name, slot, &observed) {
                                        payload = Some(TriggerPayload {
                                            value: observed,
                                            cell: None,
                                        });
                                        break;
                                    }
                                }
                                // No observation this turn; keep the
                                // previous one for the next comparison.
                                Ok(None) => {}
                                Err(err) => {
                                    error!(rule = %name, error = %err, "rule condition failed");
                                }
                            },
                        }
                    }
                    if let Some(payload) = payload {
                        handler(Some(&payload));
                        fired.push(name);
                    }
                }
                NormalizedTrigger::Cron(_) => {}
            }
        }
        fired
    }

    /// React to a cron entry coming due. Fires the handler of every cron
    /// rule whose schedule string equals `spec`.
    pub fn cron_due(&self, spec: &str) -> Vec<String> {
        let mut fired = Vec::new();
        let count = {
            let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
            rules.len()
        };
        for index in 0..count {
            let Some((name, trigger, handler)) = self.snapshot(index) else {
                continue;
            };
            if matches!(&trigger, NormalizedTrigger::Cron(rule_spec) if rule_spec == spec) {
                handler(None);
                fired.push(name);
            }
        }
        fired
    }

    fn snapshot(
        &self,
        index: usize,
    ) -> Option<(String, NormalizedTrigger, crate::rules::Handler)> {
        let rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        rules.get(index).map(|active| {
            (
                active.rule.name.clone(),
                active.rule.trigger.clone(),
                Arc::clone(&active.rule.handler),
            )
        })
    }

    /// Record an edge-trigger evaluation. Returns whether this counts as a
    /// rising edge.
    fn record_truth(&self, name: &str, truth: bool) -> bool {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = rules.iter_mut().find(|active| active.rule.name == name) else {
            return false;
        };
        let rose = truth && active.last_truth != Some(true);
        active.last_truth = Some(truth);
        rose
    }

    /// Record a value-watch observation. Returns whether it differs from
    /// the previous observation.
    fn record_value(&self, name: &str, slot: usize, observed: &CellValue) -> bool {
        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(active) = rules.iter_mut().find(|active| active.rule.name == name) else {
            return false;
        };
        let Some(last) = active.last_values.get_mut(slot) else {
            return false;
        };
        let changed = last.as_ref() != Some(observed);
        *last = Some(observed.clone());
        changed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cell_store::CellStore;
    use crate::cell_store::tests::InMemoryCellBackend;
    use cellhub_domain::cell::CellRef;
    use crate::ports::CellBackend;
    use crate::rules::{RuleDef, RuleEngine};

    fn harness() -> (Arc<InMemoryCellBackend>, Arc<RuleDispatcher>, RuleEngine) {
        let backend = Arc::new(InMemoryCellBackend::default());
        let dispatcher = Arc::new(RuleDispatcher::new());
        let store = Arc::new(CellStore::new(
            Arc::clone(&backend) as Arc<dyn CellBackend>
        ));
        let engine = RuleEngine::new(store, Arc::clone(&dispatcher) as Arc<dyn RuleSink>);
        (backend, dispatcher, engine)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Fn(Option<&TriggerPayload>) + Send + Sync) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (count, move |_: Option<&TriggerPayload>| {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn should_fire_level_rule_on_every_true_evaluation() {
        let (backend, dispatcher, engine) = harness();
        let store = Arc::clone(engine.store());
        let cell: CellRef = "dev1/temp".parse().unwrap();
        let (count, handler) = counter();
        let predicate_cell = cell.clone();
        let def = RuleDef::builder()
            .when(move || Ok(store.read(&predicate_cell)?.as_f64() > Some(30.0)))
            .then(handler)
            .build()
            .unwrap();
        engine.define_rule("too hot", def).unwrap();

        backend.set("dev1", "temp", 35.0);
        dispatcher.cell_changed("dev1", "temp", &CellValue::from(35.0));
        dispatcher.cell_changed("dev1", "temp", &CellValue::from(35.0));
        dispatcher.cell_changed("dev1", "temp", &CellValue::from(35.0));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn should_fire_edge_rule_once_per_rising_edge() {
        let (backend, dispatcher, engine) = harness();
        let store = Arc::clone(engine.store());
        let (count, handler) = counter();
        let def = RuleDef::builder()
            .as_soon_as(move || {
                Ok(store.read(&"dev1/level".parse()?)?.as_f64() > Some(10.0))
            })
            .then(handler)
            .build()
            .unwrap();
        engine.define_rule("over threshold", def).unwrap();

        for level in [5.0, 15.0, 15.0, 5.0, 15.0] {
            backend.set("dev1", "level", level);
            dispatcher.cell_changed("dev1", "level", &CellValue::from(level));
        }
        // Two rising edges: 5→15 and 5→15 again.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_fire_edge_rule_when_first_evaluation_is_true() {
        let (backend, dispatcher, engine) = harness();
        let store = Arc::clone(engine.store());
        let (count, handler) = counter();
        let def = RuleDef::builder()
            .as_soon_as(move || {
                Ok(store.read(&"dev1/flag".parse()?)? == CellValue::Bool(true))
            })
            .then(handler)
            .build()
            .unwrap();
        engine.define_rule("armed", def).unwrap();

        backend.set("dev1", "flag", true);
        dispatcher.cell_changed("dev1", "flag", &CellValue::from(true));
        dispatcher.cell_changed("dev1", "flag", &CellValue::from(true));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_not_fire_edge_rule_while_cell_is_incomplete() {
        let (backend, dispatcher, engine) = harness();
        let store = Arc::clone(engine.store());
        let (count, handler) = counter();
        let def = RuleDef::builder()
            .as_soon_as(move || {
                Ok(store.read(&"dev1/flag".parse()?)? == CellValue::Bool(true))
            })
            .then(handler)
            .build()
            .unwrap();
        engine.define_rule("armed", def).unwrap();

        // The cell has never been written, so the wrapped condition reads
        // as false and the rule stays quiet.
        dispatcher.cell_changed("other/dev", "x", &CellValue::from(1.0));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        backend.set("dev1", "flag", true);
        dispatcher.cell_changed("dev1", "flag", &CellValue::from(true));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_pass_changed_cell_and_value_to_handler() {
        let (_, dispatcher, engine) = harness();
        let seen: Arc<Mutex<Vec<TriggerPayload>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let def = RuleDef::builder()
            .when_changed("hall/motion")
            .then(move |payload| {
                if let Some(payload) = payload {
                    sink.lock().unwrap().push(payload.clone());
                }
            })
            .build()
            .unwrap();
        engine.define_rule("hall watcher", def).unwrap();

        dispatcher.cell_changed("hall", "motion", &CellValue::from(true));
        dispatcher.cell_changed("porch", "motion", &CellValue::from(true));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].value, CellValue::from(true));
        assert_eq!(
            seen[0].cell.as_ref().map(ToString::to_string),
            Some("hall/motion".to_string())
        );
    }

    #[test]
    fn should_fire_value_watch_only_when_observation_differs() {
        let (backend, dispatcher, engine) = harness();
        let store = Arc::clone(engine.store());
        let (count, handler) = counter();
        let def = RuleDef::builder()
            .when_changed_value(move || store.read(&"dev1/mode".parse()?))
            .then(handler)
            .build()
            .unwrap();
        engine.define_rule("mode watcher", def).unwrap();

        backend.set("dev1", "mode", "eco");
        dispatcher.cell_changed("dev1", "mode", &CellValue::from("eco"));
        dispatcher.cell_changed("dev1", "mode", &CellValue::from("eco"));
        backend.set("dev1", "mode", "boost");
        dispatcher.cell_changed("dev1", "mode", &CellValue::from("boost"));
        // First observation, then one change. The repeated value in the
        // middle produces nothing.
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn should_replace_rule_registered_under_same_name() {
        let (_, dispatcher, engine) = harness();
        let (old_count, old_handler) = counter();
        let (new_count, new_handler) = counter();

        let def = RuleDef::builder().when(|| Ok(true)).then(old_handler).build().unwrap();
        engine.define_rule("switchable", def).unwrap();
        let def = RuleDef::builder().when(|| Ok(true)).then(new_handler).build().unwrap();
        engine.define_rule("switchable", def).unwrap();

        dispatcher.cell_changed("dev1", "x", &CellValue::from(1.0));
        assert_eq!(old_count.load(Ordering::SeqCst), 0);
        assert_eq!(new_count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.rule_names(), vec!["switchable"]);
    }

    #[test]
    fn should_fire_cron_rules_matching_schedule() {
        let (_, dispatcher, engine) = harness();
        let (morning_count, morning_handler) = counter();
        let (evening_count, evening_handler) = counter();
        let def = RuleDef::builder()
            .when_cron("0 8 * * *")
            .then(morning_handler)
            .build()
            .unwrap();
        engine.define_rule("morning", def).unwrap();
        let def = RuleDef::builder()
            .when_cron("0 20 * * *")
            .then(evening_handler)
            .build()
            .unwrap();
        engine.define_rule("evening", def).unwrap();

        assert_eq!(dispatcher.cron_due("0 8 * * *"), vec!["morning"]);
        assert_eq!(morning_count.load(Ordering::SeqCst), 1);
        assert_eq!(evening_count.load(Ordering::SeqCst), 0);
        // Cron rules ignore cell traffic.
        dispatcher.cell_changed("dev1", "x", &CellValue::from(1.0));
        assert_eq!(morning_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn should_allow_handler_to_define_rules() {
        let (_, dispatcher, engine) = harness();
        let engine = Arc::new(engine);
        let inner_engine = Arc::clone(&engine);
        let def = RuleDef::builder()
            .when(|| Ok(true))
            .then(move |_| {
                let nested = RuleDef::builder()
                    .when(|| Ok(true))
                    .then(|_| {})
                    .build()
                    .unwrap();
                inner_engine.define_rule("nested", nested).unwrap();
            })
            .build()
            .unwrap();
        engine.define_rule("outer", def).unwrap();

        // Must not deadlock; the nested rule lands for the next pass.
        dispatcher.cell_changed("dev1", "x", &CellValue::from(1.0));
        assert_eq!(dispatcher.rule_names(), vec!["outer", "nested"]);
    }
}
