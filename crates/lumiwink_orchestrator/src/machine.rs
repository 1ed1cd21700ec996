//! Device state machine
//!
//! Every event entry point is total: it either moves the device to a new
//! phase (publishing `state-changed` and any emotion side effect) or does
//! nothing. Requesting the phase the device is already in is a no-op.
//!
//! Locking: the device lock is held only while reading or mutating
//! [`DeviceState`]. It is released before the emotion engine is called and
//! before anything is published.

use chrono::{DateTime, Utc};
use lumiwink_affect::EmotionEngine;
use lumiwink_core::{DeviceState, OrchestratorConfig, Outbound, Phase, Publisher};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

const POSE_PAN_LIMIT: f64 = 90.0;
const POSE_TILT_LIMIT: f64 = 45.0;

#[derive(Debug)]
struct Machine {
    device: DeviceState,
    /// Last wall-clock heartbeat window seen by `periodic`
    heartbeat_window: Option<i64>,
}

/// The behavioral state machine. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct StateMachine {
    machine: Arc<Mutex<Machine>>,
    emotions: Arc<EmotionEngine>,
    publisher: Arc<dyn Publisher>,
    settings: Arc<OrchestratorConfig>,
}

impl StateMachine {
    pub fn new(
        emotions: Arc<EmotionEngine>,
        publisher: Arc<dyn Publisher>,
        settings: OrchestratorConfig,
    ) -> Self {
        Self {
            machine: Arc::new(Mutex::new(Machine {
                device: DeviceState::new(Instant::now()),
                heartbeat_window: None,
            })),
            emotions,
            publisher,
            settings: Arc::new(settings),
        }
    }

    pub async fn phase(&self) -> Phase {
        self.machine.lock().await.device.phase
    }

    pub async fn snapshot(&self) -> DeviceState {
        self.machine.lock().await.device.clone()
    }

    pub fn emotions(&self) -> &Arc<EmotionEngine> {
        &self.emotions
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Move to the phase named `target`.
    ///
    /// Unknown names and the current phase are silent no-ops. Returns
    /// whether the phase changed.
    pub async fn set_state(&self, target: &str) -> bool {
        match target.parse::<Phase>() {
            Ok(phase) => self.transition(phase).await,
            Err(e) => {
                tracing::debug!("Ignoring transition request: {}", e);
                false
            }
        }
    }

    pub async fn transition(&self, target: Phase) -> bool {
        self.transition_from(None, target).await
    }

    /// Compare-and-set transition: only applies if the current phase is
    /// `expected` (when given). Deferred and conditional transitions go
    /// through here so they re-check the phase at fire time.
    async fn transition_from(&self, expected: Option<Phase>, target: Phase) -> bool {
        let prev = {
            let mut machine = self.machine.lock().await;
            let current = machine.device.phase;
            if current == target {
                return false;
            }
            if let Some(expected) = expected {
                if current != expected {
                    tracing::debug!(
                        "Skipping {} -> {}: device is in {}",
                        expected,
                        target,
                        current
                    );
                    return false;
                }
            }
            machine.device.phase = target;
            machine.device.last_transition = Instant::now();
            if target == Phase::Idle {
                machine.device.current_reply_id = None;
            }
            current
        };

        tracing::info!("State {} -> {}", prev, target);
        self.publisher.publish(Outbound::StateChanged {
            state: target,
            prev,
        });

        match target {
            Phase::Attend => {
                self.emotions.emit("surprised", 0.9, Some(900)).await;
            }
            Phase::Speak => {
                self.emotions.emit("happy", 0.6, None).await;
            }
            _ => {}
        }
        true
    }

    async fn touch_activity(&self) {
        self.machine.lock().await.device.last_user_activity = Instant::now();
    }

    // ------------------------------------------------------------------
    // Event entry points
    // ------------------------------------------------------------------

    /// Wake word heard.
    pub async fn on_wake(&self) {
        if self.transition(Phase::Attend).await {
            self.publisher.publish(Outbound::LightCommand {
                mode: "attend".to_string(),
                intensity: 0.6,
            });
        }
        self.touch_activity().await;
    }

    /// Speech recognized: listen, hand the text to dialogue, then think.
    pub async fn on_speech_detected(&self, text: String, speaker: Option<String>) {
        self.transition(Phase::Listen).await;
        self.touch_activity().await;
        self.publisher
            .publish(Outbound::DialogueQuery { text, speaker });
        self.transition(Phase::Think).await;
    }

    /// Dialogue produced a reply: speak it.
    pub async fn on_dialogue_reply(&self, text: String) {
        self.transition(Phase::Speak).await;
        let reply_id = Uuid::new_v4().to_string();
        tracing::debug!("Speaking reply {}", reply_id);
        self.machine.lock().await.device.current_reply_id = Some(reply_id);
        self.publisher.publish(Outbound::SpeechRequest { text });
    }

    /// Speech synthesis finished: reflect briefly, then go idle.
    ///
    /// The idle hop runs on a detached task and only applies if the device
    /// is still reflecting when it fires.
    pub async fn on_speech_done(&self) {
        self.transition(Phase::Reflect).await;

        let machine = self.clone();
        let delay = self.settings.reflect_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            machine
                .transition_from(Some(Phase::Reflect), Phase::Idle)
                .await;
        });
    }

    /// Number of people in view changed.
    pub async fn on_presence(&self, count: i64) {
        let (phase, idle_for) = {
            let machine = self.machine.lock().await;
            (
                machine.device.phase,
                Instant::now().duration_since(machine.device.last_user_activity),
            )
        };

        if count == 0 && phase == Phase::Idle {
            if idle_for > self.settings.sleep_after() {
                self.transition_from(Some(Phase::Idle), Phase::Sleep).await;
            }
        } else if count > 0 && phase == Phase::Sleep {
            self.transition_from(Some(Phase::Sleep), Phase::Idle).await;
        }
    }

    /// Look toward a target. Angles are clamped to the actuator range.
    pub fn on_gaze(&self, az: f64, el: f64) {
        let pan = az.clamp(-POSE_PAN_LIMIT, POSE_PAN_LIMIT);
        let tilt = el.clamp(-POSE_TILT_LIMIT, POSE_TILT_LIMIT);
        self.publisher.publish(Outbound::PoseCommand { pan, tilt });
    }

    /// Periodic housekeeping, called at a fixed cadence.
    pub async fn periodic(&self) {
        self.periodic_at(Utc::now()).await;
    }

    /// Emits a soft "calm" heartbeat when idle and a wall-clock heartbeat
    /// boundary has been crossed since the previous call.
    pub async fn periodic_at(&self, now: DateTime<Utc>) {
        let period = self.settings.heartbeat_period_secs.max(1) as i64;
        let window = now.timestamp().div_euclid(period);

        let heartbeat = {
            let mut machine = self.machine.lock().await;
            let crossed = matches!(machine.heartbeat_window, Some(w) if w != window);
            machine.heartbeat_window = Some(window);
            crossed && machine.device.phase == Phase::Idle
        };

        if heartbeat {
            self.emotions.emit("calm", 0.4, Some(1200)).await;
        }
    }
}
