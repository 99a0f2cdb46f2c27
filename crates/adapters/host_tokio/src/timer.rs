//! Timer scheduling on Tokio tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cellhub_domain::id::TimerId;
use cellhub_engine::ports::{TimerCallback, TimerHost};
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tracing::trace;

/// One Tokio task per armed timer. Stopping aborts the task.
pub struct TokioTimerHost {
    runtime: Handle,
    tasks: Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
}

impl TokioTimerHost {
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime(Handle::current())
    }

    #[must_use]
    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn lock_tasks(
        tasks: &Arc<Mutex<HashMap<TimerId, AbortHandle>>>,
    ) -> std::sync::MutexGuard<'_, HashMap<TimerId, AbortHandle>> {
        tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TokioTimerHost {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerHost for TokioTimerHost {
    fn start(&self, id: TimerId, delay: Duration, periodic: bool, on_fire: TimerCallback) {
        let tasks = Arc::clone(&self.tasks);
        let handle = self.runtime.spawn(async move {
            if periodic {
                let mut interval = tokio::time::interval(delay);
                // The first tick of a Tokio interval completes at once.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    trace!(timer = %id, "interval expired");
                    on_fire();
                }
            } else {
                tokio::time::sleep(delay).await;
                trace!(timer = %id, "timeout expired");
                Self::lock_tasks(&tasks).remove(&id);
                on_fire();
            }
        });
        Self::lock_tasks(&self.tasks).insert(id, handle.abort_handle());
    }

    fn stop(&self, id: TimerId) {
        if let Some(handle) = Self::lock_tasks(&self.tasks).remove(&id) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn tick_counter() -> (Arc<AtomicUsize>, TimerCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&count);
        (
            count,
            Arc::new(move || {
                handle.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_one_shot_after_delay() {
        let host = TokioTimerHost::new();
        let (count, callback) = tick_counter();
        host.start(TimerId::new(), Duration::from_secs(5), false, callback);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn should_fire_interval_repeatedly_until_stopped() {
        let host = TokioTimerHost::new();
        let (count, callback) = tick_counter();
        let id = TimerId::new();
        host.start(id, Duration::from_secs(10), true, callback);

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        host.stop(id);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn should_ignore_stop_of_expired_one_shot() {
        let host = TokioTimerHost::new();
        let (count, callback) = tick_counter();
        let id = TimerId::new();
        host.start(id, Duration::from_millis(10), false, callback);

        tokio::time::sleep(Duration::from_millis(50)).await;
        host.stop(id);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
