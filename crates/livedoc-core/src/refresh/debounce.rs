//! Trailing-edge debounce timer.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs an action once no trigger has arrived for the configured delay.
///
/// Every trigger resets the timer. The action is spawned, so triggers made
/// while it runs start a new debounce cycle.
pub struct Debouncer {
    ticks: mpsc::UnboundedSender<()>,
    delay_ms: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl Debouncer {
    /// Start the timer task. Must be called within a tokio runtime.
    pub fn spawn<F, Fut>(delay: Duration, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (ticks, mut rx) = mpsc::unbounded_channel::<()>();
        let delay_ms = Arc::new(AtomicU64::new(millis(delay)));
        let task_delay = Arc::clone(&delay_ms);

        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                loop {
                    let delay = Duration::from_millis(task_delay.load(Ordering::Relaxed));
                    tokio::select! {
                        tick = rx.recv() => {
                            if tick.is_none() {
                                return;
                            }
                        }
                        () = tokio::time::sleep(delay) => break,
                    }
                }
                tracing::debug!(target: "livedoc::refresh", "debounce timer fired");
                tokio::spawn(action());
            }
        });

        Self { ticks, delay_ms, task }
    }

    /// Reset the timer.
    pub fn trigger(&self) {
        let _ = self.ticks.send(());
    }

    /// Delay used from the next timer reset on.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(millis(delay), Ordering::Relaxed);
    }

    #[must_use]
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.load(Ordering::Relaxed))
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}
