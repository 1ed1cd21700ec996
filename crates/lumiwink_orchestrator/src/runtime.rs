//! Orchestrator runtime
//!
//! Wires the emotion engine, the state machine and the dispatcher together
//! and owns the two background loops:
//! - the TTL watchdog (expires overlays)
//! - the periodic ticker (idle heartbeat)
//!
//! Both stop deterministically on [`Orchestrator::shutdown`].

use crate::dispatch::Dispatcher;
use crate::machine::StateMachine;
use lumiwink_affect::{EmotionEngine, Watchdog, WatchdogConfig};
use lumiwink_core::{LumiConfig, Publisher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub struct Orchestrator {
    dispatcher: Dispatcher,
    emotions: Arc<EmotionEngine>,
    watchdog: Watchdog,
    ticker_stop: watch::Sender<bool>,
    ticker: JoinHandle<()>,
}

impl Orchestrator {
    /// Build everything and start the background loops on the current
    /// tokio runtime.
    pub fn start(config: LumiConfig, publisher: Arc<dyn Publisher>) -> Self {
        let watchdog_config = WatchdogConfig::with_interval(config.watchdog_interval());
        let tick_interval = config.orchestrator.tick_interval();
        let settings = config.orchestrator.clone();

        let emotions = Arc::new(EmotionEngine::new(
            Arc::new(config),
            Arc::clone(&publisher),
        ));
        let machine = StateMachine::new(Arc::clone(&emotions), publisher, settings);

        let watchdog = Watchdog::spawn(Arc::clone(&emotions), watchdog_config.clone());
        let (ticker_stop, ticker) = spawn_ticker(machine.clone(), tick_interval);

        tracing::info!(
            "Orchestrator started (tick={:?}, watchdog={:?})",
            tick_interval,
            watchdog_config.interval
        );

        Self {
            dispatcher: Dispatcher::new(machine),
            emotions,
            watchdog,
            ticker_stop,
            ticker,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn machine(&self) -> &StateMachine {
        self.dispatcher.machine()
    }

    pub fn emotions(&self) -> &Arc<EmotionEngine> {
        &self.emotions
    }

    /// Stop both loops and wait for them to exit.
    pub async fn shutdown(self) {
        let _ = self.ticker_stop.send(true);
        if let Err(e) = self.ticker.await {
            tracing::warn!("Periodic ticker failed: {}", e);
        }
        self.watchdog.shutdown().await;
        tracing::info!("Orchestrator stopped");
    }
}

fn spawn_ticker(
    machine: StateMachine,
    period: Duration,
) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => machine.periodic().await,
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                }
            }
        }
    });

    (stop_tx, handle)
}
