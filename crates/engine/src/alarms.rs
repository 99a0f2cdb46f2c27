//! Alarm monitoring on top of the rule engine.
//!
//! An alarm declaration (one watched cell, one condition, the notification
//! messages) is compiled into a pair of edge-triggered rules: one arms the
//! alarm when the condition is breached, one clears it when the condition
//! is satisfied again. Every recipient from the configuration file gets
//! every notification. An alarm with a re-notification interval repeats
//! its message on a periodic timer until it clears.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cellhub_domain::alarm::{AlarmPlan, AlarmsConfig, RecipientSpec, fill_placeholder};
use cellhub_domain::error::{CellHubError, DefinitionError};
use cellhub_domain::id::TimerId;
use cellhub_domain::time::{self, Timestamp};
use tracing::{info, warn};

use crate::notify::Notifier;
use crate::ports::ConfigSource;
use crate::rules::{RuleDef, RuleEngine};
use crate::timers::TimerService;

/// Distinguishes rule pairs when the same cell is alarmed more than once
/// over the process lifetime.
static ALARM_SEQ: AtomicU64 = AtomicU64::new(0);

/// Where the alarm configuration comes from.
pub enum AlarmSource {
    /// Already-parsed JSON, as a host embedding the engine would pass it.
    Inline(serde_json::Value),
    /// Path for the [`ConfigSource`] to read.
    Path(String),
}

type NotifyFn = Arc<dyn Fn(&str) + Send + Sync>;

struct AlarmState {
    active: bool,
    since: Option<Timestamp>,
    repeat: Option<TimerId>,
}

/// Loads alarm configurations and installs their rules.
pub struct AlarmService {
    engine: Arc<RuleEngine>,
    timers: TimerService,
    notifier: Notifier,
    config: Arc<dyn ConfigSource>,
}

impl AlarmService {
    #[must_use]
    pub fn new(
        engine: Arc<RuleEngine>,
        timers: TimerService,
        notifier: Notifier,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        Self {
            engine,
            timers,
            notifier,
            config,
        }
    }

    /// Load an alarm configuration and register rules for every alarm in
    /// it. Validation happens up front: a configuration with any invalid
    /// alarm registers nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] for unreadable, unparsable or invalid
    /// configurations.
    pub fn load(&self, source: AlarmSource) -> Result<(), CellHubError> {
        let raw = match source {
            AlarmSource::Inline(value) => value,
            AlarmSource::Path(path) => self.config.read(&path)?,
        };
        let config: AlarmsConfig =
            serde_json::from_value(raw).map_err(DefinitionError::InvalidAlarmConfig)?;
        let plans = config.validate()?;
        let notify = self.broadcaster(&config.recipients);
        for plan in plans {
            self.install(plan, Arc::clone(&notify))?;
        }
        Ok(())
    }

    /// One closure that fans a message out to every configured recipient.
    fn broadcaster(&self, recipients: &[RecipientSpec]) -> NotifyFn {
        let recipients = recipients.to_vec();
        let notifier = self.notifier.clone();
        Arc::new(move |message: &str| {
            for recipient in &recipients {
                match recipient {
                    RecipientSpec::Email { to, subject } => {
                        let subject = match subject {
                            Some(template) => fill_placeholder(template, message),
                            None => message.to_string(),
                        };
                        notifier.send_email(to, &subject, message);
                    }
                    RecipientSpec::Sms { to } => notifier.send_sms(to, message),
                }
            }
        })
    }

    /// Register the activate/deactivate rule pair for one alarm.
    fn install(&self, plan: AlarmPlan, notify: NotifyFn) -> Result<(), CellHubError> {
        let seq = ALARM_SEQ.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("__alarm{seq}__{}__", plan.cell);
        let plan = Arc::new(plan);
        let state = Arc::new(Mutex::new(AlarmState {
            active: false,
            since: None,
            repeat: None,
        }));

        let store = Arc::clone(self.engine.store());
        let condition_plan = Arc::clone(&plan);
        let condition_store = Arc::clone(&store);
        let activate_condition = move || -> Result<bool, CellHubError> {
            let value = condition_store.read(&condition_plan.cell)?;
            Ok(condition_plan.condition.is_breached(&value))
        };

        let handler_plan = Arc::clone(&plan);
        let handler_state = Arc::clone(&state);
        let handler_store = Arc::clone(&store);
        let handler_notify = Arc::clone(&notify);
        let timers = self.timers.clone();
        let activate = move |_: Option<&crate::rules::TriggerPayload>| {
            {
                let mut state = handler_state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if state.active {
                    return;
                }
                state.active = true;
                state.since = Some(time::now());
            }
            let value = handler_store.peek(&handler_plan.cell);
            let message = handler_plan.alarm_message(&value);
            warn!(cell = %handler_plan.cell, value = %value, "alarm raised");
            handler_notify(&message);
            if let Some(interval) = handler_plan.interval {
                let repeat_plan = Arc::clone(&handler_plan);
                let repeat_store = Arc::clone(&handler_store);
                let repeat_notify = Arc::clone(&handler_notify);
                let id = timers.set_interval(interval, move || {
                    let value = repeat_store.peek(&repeat_plan.cell);
                    repeat_notify(&repeat_plan.alarm_message(&value));
                });
                let mut state = handler_state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                state.repeat = Some(id);
            }
        };

        self.engine.define_rule(
            &format!("{prefix}activate"),
            RuleDef::builder()
                .as_soon_as(activate_condition)
                .then(activate)
                .build()?,
        )?;

        let condition_plan = Arc::clone(&plan);
        let condition_store = Arc::clone(&store);
        let deactivate_condition = move || -> Result<bool, CellHubError> {
            let value = condition_store.read(&condition_plan.cell)?;
            Ok(condition_plan.condition.is_satisfied(&value))
        };

        let handler_state = Arc::clone(&state);
        let timers = self.timers.clone();
        let deactivate = move |_: Option<&crate::rules::TriggerPayload>| {
            let since = {
                let mut state = handler_state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if !state.active {
                    return;
                }
                state.active = false;
                if let Some(id) = state.repeat.take() {
                    timers.stop(id);
                }
                state.since.take()
            };
            let value = store.peek(&plan.cell);
            let active_for = since.map(|since| time::now() - since);
            info!(
                cell = %plan.cell,
                active_for = active_for.map(|d| d.num_seconds()),
                "alarm cleared"
            );
            notify(&plan.recovery_message(&value));
        };

        self.engine.define_rule(
            &format!("{prefix}deactivate"),
            RuleDef::builder()
                .as_soon_as(deactivate_condition)
                .then(deactivate)
                .build()?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell_store::CellStore;
    use crate::cell_store::tests::InMemoryCellBackend;
    use crate::dispatcher::RuleDispatcher;
    use crate::notify::tests::FakeProcessHost;
    use crate::ports::{CellBackend, ProcessHost, RuleSink, TimerHost};
    use crate::timers::tests::FakeTimerHost;
    use cellhub_domain::error::ConfigError;
    use cellhub_domain::value::CellValue;
    use serde_json::json;

    struct NoConfig;

    impl ConfigSource for NoConfig {
        fn read(&self, path: &str) -> Result<serde_json::Value, ConfigError> {
            Err(ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                path.to_string(),
            )))
        }
    }

    struct Harness {
        backend: Arc<InMemoryCellBackend>,
        dispatcher: Arc<RuleDispatcher>,
        timer_host: Arc<FakeTimerHost>,
        process_host: Arc<FakeProcessHost>,
        service: AlarmService,
    }

    fn harness() -> Harness {
        let backend = Arc::new(InMemoryCellBackend::default());
        let dispatcher = Arc::new(RuleDispatcher::new());
        let timer_host = Arc::new(FakeTimerHost::default());
        let process_host = Arc::new(FakeProcessHost::default());
        let store = Arc::new(CellStore::new(
            Arc::clone(&backend) as Arc<dyn CellBackend>
        ));
        let engine = Arc::new(RuleEngine::new(
            store,
            Arc::clone(&dispatcher) as Arc<dyn RuleSink>,
        ));
        let timers = TimerService::new(Arc::clone(&timer_host) as Arc<dyn TimerHost>);
        let notifier = Notifier::new(Arc::clone(&process_host) as Arc<dyn ProcessHost>);
        let service = AlarmService::new(engine, timers, notifier, Arc::new(NoConfig));
        Harness {
            backend,
            dispatcher,
            timer_host,
            process_host,
            service,
        }
    }

    impl Harness {
        fn set_and_dispatch(&self, device: &str, control: &str, value: impl Into<CellValue>) {
            let value = value.into();
            self.backend.set(device, control, value.clone());
            self.dispatcher.cell_changed(device, control, &value);
        }

        /// Texts handed to the SMS pipeline, in send order, draining the
        /// queue as a working modem would.
        fn sms_texts(&self) -> Vec<String> {
            let mut texts = Vec::new();
            let mut index = 0;
            while index < self.process_host.spawn_count() {
                if let Some(text) = self.process_host.stdin_of(index) {
                    texts.push(text);
                }
                self.process_host.finish(index, 0);
                index += 1;
            }
            texts
        }
    }

    fn expected_value_config() -> serde_json::Value {
        json!({
            "recipients": [{"type": "sms", "to": "+100"}],
            "alarms": [{
                "cell": "boiler/state",
                "expectedValue": 5.0
            }]
        })
    }

    #[test]
    fn should_notify_once_per_excursion_for_expected_value_alarm() {
        let h = harness();
        h.service
            .load(AlarmSource::Inline(expected_value_config()))
            .unwrap();

        for value in [5.0, 5.0, 7.0, 7.0, 5.0] {
            h.set_and_dispatch("boiler", "state", value);
        }

        let texts = h.sms_texts();
        assert_eq!(
            texts,
            vec![
                "boiler/state has unexpected value = 7".to_string(),
                "boiler/state is back to normal, value = 5".to_string(),
            ]
        );
    }

    #[test]
    fn should_repeat_notification_on_interval_until_recovery() {
        let h = harness();
        let config = json!({
            "recipients": [{"type": "sms", "to": "+100"}],
            "alarms": [{
                "cell": "tank/level",
                "minValue": 10.0,
                "maxValue": 20.0,
                "interval": 60.0
            }]
        });
        h.service.load(AlarmSource::Inline(config)).unwrap();

        h.set_and_dispatch("tank", "level", 25.0);
        let armed = h.timer_host.armed_ids();
        assert_eq!(armed.len(), 1);
        assert_eq!(
            h.timer_host.delay_of(armed[0]),
            Some((std::time::Duration::from_secs(60), true))
        );

        // Two interval expiries while still out of bounds.
        h.timer_host.tick(armed[0]);
        h.timer_host.tick(armed[0]);

        h.set_and_dispatch("tank", "level", 15.0);
        assert_eq!(h.timer_host.stopped_ids(), armed);

        let texts = h.sms_texts();
        assert_eq!(
            texts,
            vec![
                "tank/level is out of bounds, value = 25".to_string(),
                "tank/level is out of bounds, value = 25".to_string(),
                "tank/level is out of bounds, value = 25".to_string(),
                "tank/level is back to normal, value = 15".to_string(),
            ]
        );
    }

    #[test]
    fn should_fan_out_to_every_recipient() {
        let h = harness();
        let config = json!({
            "recipients": [
                {"type": "email", "to": "ops@example.com", "subject": "alarm: {}"},
                {"type": "sms", "to": "+100"}
            ],
            "alarms": [{
                "cell": "boiler/state",
                "expectedValue": true
            }]
        });
        h.service.load(AlarmSource::Inline(config)).unwrap();

        h.set_and_dispatch("boiler", "state", false);

        assert_eq!(h.process_host.spawn_count(), 2);
        let commands = h.process_host.commands();
        assert!(commands[0][2].contains("sendmail"));
        assert!(commands[1][2].contains("gammu sendsms"));
        assert_eq!(
            h.process_host.stdin_of(0),
            Some(
                "Subject: alarm: boiler/state has unexpected value = false\n\n\
                 boiler/state has unexpected value = false"
                    .to_string()
            )
        );
    }

    #[test]
    fn should_register_nothing_for_invalid_configuration() {
        let h = harness();
        let config = json!({
            "recipients": [{"type": "sms", "to": "+100"}],
            "alarms": [
                {"cell": "ok/cell", "expectedValue": 1.0},
                {"cell": "bad/cell", "expectedValue": 1.0, "minValue": 0.0}
            ]
        });
        let result = h.service.load(AlarmSource::Inline(config));
        assert!(matches!(
            result,
            Err(CellHubError::Definition(
                DefinitionError::ConflictingAlarmBounds { .. }
            ))
        ));
        assert!(h.dispatcher.rule_names().is_empty());
    }

    #[test]
    fn should_not_raise_alarm_while_cell_is_incomplete() {
        let h = harness();
        h.service
            .load(AlarmSource::Inline(expected_value_config()))
            .unwrap();

        // Never written, so the condition reads as incomplete and stays
        // quiet instead of alarming on the placeholder value.
        h.dispatcher
            .cell_changed("other", "cell", &CellValue::from(1.0));
        assert_eq!(h.process_host.spawn_count(), 0);
    }

    #[test]
    fn should_register_one_rule_pair_per_alarm() {
        let h = harness();
        h.service
            .load(AlarmSource::Inline(expected_value_config()))
            .unwrap();
        let names = h.dispatcher.rule_names();
        assert_eq!(names.len(), 2);
        assert!(names[0].contains("boiler/state") && names[0].ends_with("activate"));
        assert!(names[1].ends_with("deactivate"));
    }
}
