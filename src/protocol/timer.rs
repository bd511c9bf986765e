//! Retryable timer (C15): idempotent start/stop/restart, exponential
//! backoff on failure.
//!
//! Grounded on `net/connection.rs`'s `RetryInfo` (attempts / last_attempt /
//! next_retry_delay, doubling to a ceiling) combined with
//! `ConnectionManager`'s `tokio::sync::Mutex`-guarded map pattern, applied
//! here to a single named timer instance rather than one per peer address.
//! Used for PIR's ping/keepalive (§11) and the dispatcher's task-expiry
//! sweep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: u32,
}

impl BackoffPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            initial_delay: interval,
            max_delay: interval,
            factor: 1,
        }
    }
}

#[derive(Debug, Default)]
struct RetryState {
    attempts: u32,
    next_delay: Duration,
}

/// A single named, restartable periodic timer. `start` is idempotent: a
/// second call while already running is a no-op, matching the teacher's
/// `startPingTimer` guard against double-scheduling on reconnect.
pub struct RetryTimer {
    policy: BackoffPolicy,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<RetryState>,
}

impl RetryTimer {
    pub fn new(policy: BackoffPolicy) -> Arc<Self> {
        Arc::new(Self {
            policy,
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            state: Mutex::new(RetryState {
                attempts: 0,
                next_delay: policy.initial_delay,
            }),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawns the tick loop if it isn't already running. `on_tick` runs on
    /// every fire and its return value (`true` = tick succeeded) drives
    /// backoff: success resets the delay, failure doubles it up to
    /// `max_delay`.
    pub async fn start<F>(self: &Arc<Self>, mut on_tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            loop {
                let delay = {
                    let state = this.state.lock().await;
                    state.next_delay
                };
                tokio::time::sleep(delay).await;
                if !this.running.load(Ordering::SeqCst) {
                    break;
                }
                let ok = on_tick();
                let mut state = this.state.lock().await;
                if ok {
                    state.attempts = 0;
                    state.next_delay = this.policy.initial_delay;
                } else {
                    state.attempts += 1;
                    let scaled = state.next_delay.saturating_mul(this.policy.factor.max(1));
                    state.next_delay = scaled.min(this.policy.max_delay);
                    debug!(attempts = state.attempts, "retry timer tick failed, backing off");
                }
            }
        });
        *self.handle.lock().await = Some(task);
    }

    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn restart<F>(self: &Arc<Self>, on_tick: F)
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.stop().await;
        self.start(on_tick).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test(start_paused = true)]
    async fn start_is_idempotent_while_running() {
        let timer = RetryTimer::new(BackoffPolicy::fixed(Duration::from_millis(10)));
        let ticks = Arc::new(AtomicUsize::new(0));
        let t1 = Arc::clone(&ticks);
        timer
            .start(move || {
                t1.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await;
        assert!(timer.is_running());
        timer.start(|| true).await;
        tokio::time::advance(Duration::from_millis(35)).await;
        timer.stop().await;
        assert!(!timer.is_running());
        assert!(ticks.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_backs_off_up_to_max_delay() {
        let timer = RetryTimer::new(BackoffPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(40),
            factor: 2,
        });
        timer.start(|| false).await;
        tokio::time::advance(Duration::from_millis(200)).await;
        let state = timer.state.lock().await;
        assert_eq!(state.next_delay, Duration::from_millis(40));
        drop(state);
        timer.stop().await;
    }
}
