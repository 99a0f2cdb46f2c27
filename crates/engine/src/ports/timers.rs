//! Timer host port: the raw timing primitive.

use std::sync::Arc;
use std::time::Duration;

use cellhub_domain::id::TimerId;

/// Invoked by the host every time a scheduled timer becomes due.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync>;

/// Schedules and cancels raw timers. The engine's [`TimerService`] adds the
/// named/anonymous indirection, the firing query and restart semantics on
/// top of this.
///
/// [`TimerService`]: crate::timers::TimerService
pub trait TimerHost: Send + Sync {
    /// Schedule a timer. `on_fire` is called once after `delay` for a
    /// one-shot timer, or repeatedly every `delay` for a periodic one,
    /// until [`stop`](TimerHost::stop) is called for the same id.
    fn start(&self, id: TimerId, delay: Duration, periodic: bool, on_fire: TimerCallback);

    /// Cancel a timer. Must be idempotent: stopping an unknown,
    /// already-stopped or already-fired timer is a no-op. Must be safe to
    /// call from within the timer's own `on_fire` callback.
    fn stop(&self, id: TimerId);
}

impl<T: TimerHost> TimerHost for Arc<T> {
    fn start(&self, id: TimerId, delay: Duration, periodic: bool, on_fire: TimerCallback) {
        (**self).start(id, delay, periodic, on_fire);
    }

    fn stop(&self, id: TimerId) {
        (**self).stop(id);
    }
}
