//! Timer bookkeeping on top of a [`TimerHost`].
//!
//! The service owns the id allocation and the name table; the host only
//! has to arm and disarm physical timers. Named timers have restart
//! semantics: starting a name that is already running cancels the old
//! timer first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use cellhub_domain::id::TimerId;
use tracing::debug;

use crate::ports::{TimerCallback, TimerHost};

struct TimerEntry {
    name: Option<String>,
    periodic: bool,
    callback: TimerCallback,
    /// Set while the callback for this timer is running, so rule code can
    /// ask "did this timer wake me".
    firing: bool,
}

#[derive(Default)]
struct TimerState {
    entries: HashMap<TimerId, TimerEntry>,
    named: HashMap<String, TimerId>,
}

struct TimerInner {
    host: Arc<dyn TimerHost>,
    state: Mutex<TimerState>,
}

/// Starts, stops and tracks timers. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TimerService {
    inner: Arc<TimerInner>,
}

impl TimerService {
    #[must_use]
    pub fn new(host: Arc<dyn TimerHost>) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                host,
                state: Mutex::new(TimerState::default()),
            }),
        }
    }

    /// One-shot timer. The callback runs once after `delay`, then the
    /// timer is forgotten.
    pub fn set_timeout<F>(&self, delay: Duration, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start(None, delay, false, Arc::new(callback))
    }

    /// Periodic timer. The callback runs every `period` until stopped.
    pub fn set_interval<F>(&self, period: Duration, callback: F) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.start(None, period, true, Arc::new(callback))
    }

    /// Start a named timer. If a timer with the same name is already
    /// running it is stopped first.
    pub fn start_named<F>(
        &self,
        name: impl Into<String>,
        delay: Duration,
        periodic: bool,
        callback: F,
    ) -> TimerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        self.stop_named(&name);
        self.start(Some(name), delay, periodic, Arc::new(callback))
    }

    /// Stop a timer by id. A no-op for ids that are not running.
    pub fn stop(&self, id: TimerId) {
        let entry = {
            let mut state = self.lock_state();
            state.entries.remove(&id)
        };
        if let Some(entry) = entry {
            if let Some(name) = &entry.name {
                let mut state = self.lock_state();
                if state.named.get(name) == Some(&id) {
                    state.named.remove(name);
                }
            }
            self.inner.host.stop(id);
        }
    }

    /// Stop a timer by name. A no-op for names that are not running.
    pub fn stop_named(&self, name: &str) {
        let id = {
            let state = self.lock_state();
            state.named.get(name).copied()
        };
        if let Some(id) = id {
            self.stop(id);
        }
    }

    /// Whether the named timer's callback is currently running. Rule code
    /// uses this to tell a timer wake-up apart from a cell change.
    #[must_use]
    pub fn is_firing(&self, name: &str) -> bool {
        let state = self.lock_state();
        state
            .named
            .get(name)
            .and_then(|id| state.entries.get(id))
            .is_some_and(|entry| entry.firing)
    }

    /// Whether a timer with this id is still running.
    #[must_use]
    pub fn is_running(&self, id: TimerId) -> bool {
        self.lock_state().entries.contains_key(&id)
    }

    fn start(
        &self,
        name: Option<String>,
        delay: Duration,
        periodic: bool,
        callback: TimerCallback,
    ) -> TimerId {
        let id = TimerId::new();
        debug!(timer = %id, name = name.as_deref(), periodic, "starting timer");
        {
            let mut state = self.lock_state();
            if let Some(name) = &name {
                state.named.insert(name.clone(), id);
            }
            state.entries.insert(
                id,
                TimerEntry {
                    name,
                    periodic,
                    callback,
                    firing: false,
                },
            );
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner.host.start(
            id,
            delay,
            periodic,
            Arc::new(move || Self::fire(&weak, id)),
        );
        id
    }

    /// Host-side fire path. The callback is cloned out of the lock before
    /// it runs, so it may freely start and stop timers, including this
    /// one.
    fn fire(weak: &Weak<TimerInner>, id: TimerId) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let callback = {
            let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(entry) = state.entries.get_mut(&id) else {
                return;
            };
            entry.firing = true;
            Arc::clone(&entry.callback)
        };
        callback();
        let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = state.entries.get_mut(&id) {
            entry.firing = false;
            if !entry.periodic {
                let name = entry.name.clone();
                state.entries.remove(&id);
                if let Some(name) = name {
                    if state.named.get(&name) == Some(&id) {
                        state.named.remove(&name);
                    }
                }
            }
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TimerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
