//! Outbound notifications and the publisher seam
//!
//! The core never talks to the bus transport directly. Everything it wants
//! the outside world to know becomes an [`Outbound`] handed to a
//! [`Publisher`], always after any state lock has been released.

use crate::emotion::EmotionRequest;
use crate::state::Phase;
use serde::Serialize;
use tokio::sync::mpsc;

/// Everything the orchestrator core publishes.
///
/// Serializes (untagged) to exactly the payload object of its channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Outbound {
    StateChanged { state: Phase, prev: Phase },
    ActiveEmotion(EmotionRequest),
    DialogueQuery { text: String, speaker: Option<String> },
    SpeechRequest { text: String },
    PoseCommand { pan: f64, tilt: f64 },
    LightCommand { mode: String, intensity: f64 },
}

impl Outbound {
    /// Short channel name, used for logging.
    pub fn channel(&self) -> &'static str {
        match self {
            Outbound::StateChanged { .. } => "state-changed",
            Outbound::ActiveEmotion(_) => "active-emotion",
            Outbound::DialogueQuery { .. } => "dialogue-query",
            Outbound::SpeechRequest { .. } => "speech-request",
            Outbound::PoseCommand { .. } => "pose-command",
            Outbound::LightCommand { .. } => "light-command",
        }
    }

    pub fn payload(&self) -> serde_json::Value {
        match serde_json::to_value(self) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Failed to serialize {} payload: {}", self.channel(), e);
                serde_json::Value::Null
            }
        }
    }
}

/// Fire-and-forget sink for outbound notifications.
///
/// Implementations must not block; the transport decides what to do with
/// delivery failures.
pub trait Publisher: Send + Sync {
    fn publish(&self, message: Outbound);
}

/// Publisher backed by an unbounded tokio channel.
///
/// The transport side drains the receiver returned by [`ChannelPublisher::new`].
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Publisher for ChannelPublisher {
    fn publish(&self, message: Outbound) {
        let channel = message.channel();
        if self.tx.send(message).is_err() {
            tracing::debug!("Outbound {} dropped: receiver closed", channel);
        }
    }
}
