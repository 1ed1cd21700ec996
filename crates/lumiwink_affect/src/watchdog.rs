//! TTL watchdog for the emotion engine
//!
//! A polling loop rather than one timer per overlay: every tick it asks the
//! engine whether the active overlay's TTL has elapsed. Expiry therefore
//! lands at most one interval after the deadline.

use crate::engine::EmotionEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Configuration for the watchdog loop
#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Polling period (default: 200ms). Keep it at or below the shortest TTL.
    pub interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
        }
    }
}

impl WatchdogConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }

    /// Fast polling for tests
    pub fn testing() -> Self {
        Self {
            interval: Duration::from_millis(10),
        }
    }
}

/// Handle to the running watchdog task.
pub struct Watchdog {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Watchdog {
    /// Spawn the polling loop on the current tokio runtime.
    pub fn spawn(engine: Arc<EmotionEngine>, config: WatchdogConfig) -> Self {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if engine.expire_if_due(Instant::now()).await {
                            tracing::trace!("Watchdog expired active emotion");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Emotion watchdog stopped");
        });

        Self { stop_tx, handle }
    }

    /// Stop the loop and wait until it has actually exited.
    pub async fn shutdown(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!("Emotion watchdog task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}
