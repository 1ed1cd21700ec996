//! Event dispatch layer
//!
//! The only place that knows wire-level topic names. Inbound messages are
//! decoded into [`Inbound`] and applied to the [`StateMachine`]; outbound
//! notices are mapped back to topics by [`Dispatcher::encode`].
//!
//! Decoding is total: unknown topics and malformed payloads are logged and
//! dropped, never surfaced to the caller.

use crate::machine::StateMachine;
use lumiwink_core::Outbound;
use serde_json::{Map, Value};

/// Wire topic names.
pub mod topics {
    pub const AUDIO_AWAKE: &str = "audio/awake";
    pub const AUDIO_STT: &str = "audio/stt";
    pub const DIALOGUE_REPLY: &str = "dialogue/reply";
    pub const TTS_DONE: &str = "tts/done";
    pub const VISION_PRESENCE: &str = "vision/presence";
    pub const VISION_TARGET: &str = "vision/target";

    pub const CORE_STATE: &str = "core/state";
    pub const CORE_EMOTION: &str = "core/emotion";
    pub const DIALOGUE_QUERY: &str = "dialogue/query";
    pub const TTS_SAY: &str = "tts/say";
    pub const ACTUATE_POSE: &str = "actuate/pose";
    pub const ACTUATE_LIGHT: &str = "actuate/light";

    /// Topics the orchestrator subscribes to.
    pub const INBOUND: [&str; 6] = [
        AUDIO_AWAKE,
        AUDIO_STT,
        DIALOGUE_REPLY,
        TTS_DONE,
        VISION_PRESENCE,
        VISION_TARGET,
    ];
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("field {field} is not a number: {value}")]
    NotANumber { field: &'static str, value: String },
    #[error("field {0} has the wrong type")]
    WrongType(&'static str),
}

/// A decoded inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Wake,
    SpeechDetected { text: String, speaker: Option<String> },
    DialogueReply { text: String },
    SpeechDone,
    Presence { count: i64 },
    GazeTarget { az: f64, el: f64 },
}

impl Inbound {
    /// Decode a raw bus message.
    ///
    /// A body that is empty, not JSON, or not a JSON object is read as `{}`.
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, DispatchError> {
        let body = parse_body(payload);
        match topic {
            topics::AUDIO_AWAKE => Ok(Inbound::Wake),
            topics::AUDIO_STT => Ok(Inbound::SpeechDetected {
                text: text_field(&body, "text")?,
                speaker: body
                    .get("speaker")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            topics::DIALOGUE_REPLY => Ok(Inbound::DialogueReply {
                text: text_field(&body, "text")?,
            }),
            topics::TTS_DONE => Ok(Inbound::SpeechDone),
            topics::VISION_PRESENCE => Ok(Inbound::Presence {
                count: count_field(&body, "count")?,
            }),
            topics::VISION_TARGET => Ok(Inbound::GazeTarget {
                az: number_field(&body, "az")?,
                el: number_field(&body, "el")?,
            }),
            other => Err(DispatchError::UnknownTopic(other.to_string())),
        }
    }
}

fn parse_body(payload: &[u8]) -> Map<String, Value> {
    if payload.is_empty() {
        return Map::new();
    }
    match serde_json::from_slice::<Value>(payload) {
        Ok(Value::Object(map)) => map,
        Ok(_) => Map::new(),
        Err(e) => {
            tracing::debug!("Inbound payload is not JSON ({}), treating as empty", e);
            Map::new()
        }
    }
}

fn text_field(body: &Map<String, Value>, field: &'static str) -> Result<String, DispatchError> {
    match body.get(field) {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DispatchError::WrongType(field)),
    }
}

fn number_field(body: &Map<String, Value>, field: &'static str) -> Result<f64, DispatchError> {
    let value = match body.get(field) {
        None | Some(Value::Null) => return Err(DispatchError::MissingField(field)),
        Some(v) => v,
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(DispatchError::NotANumber {
            field,
            value: value.to_string(),
        }),
    }
}

fn count_field(body: &Map<String, Value>, field: &'static str) -> Result<i64, DispatchError> {
    let value = match body.get(field) {
        None => return Ok(0),
        Some(v) => v,
    };
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    };
    parsed.ok_or_else(|| DispatchError::NotANumber {
        field,
        value: value.to_string(),
    })
}

/// Maps bus traffic onto the state machine.
#[derive(Clone)]
pub struct Dispatcher {
    machine: StateMachine,
}

impl Dispatcher {
    pub fn new(machine: StateMachine) -> Self {
        Self { machine }
    }

    pub fn machine(&self) -> &StateMachine {
        &self.machine
    }

    /// Handle one inbound bus message. Never fails outward.
    pub async fn handle(&self, topic: &str, payload: &[u8]) {
        match Inbound::decode(topic, payload) {
            Ok(event) => self.apply(event).await,
            Err(DispatchError::UnknownTopic(t)) => {
                tracing::debug!("Ignoring message on unknown topic {}", t);
            }
            Err(e) => {
                tracing::debug!("Dropping malformed {} message: {}", topic, e);
            }
        }
    }

    /// Apply an already-decoded event.
    pub async fn apply(&self, event: Inbound) {
        match event {
            Inbound::Wake => self.machine.on_wake().await,
            Inbound::SpeechDetected { text, speaker } => {
                self.machine.on_speech_detected(text, speaker).await
            }
            Inbound::DialogueReply { text } => self.machine.on_dialogue_reply(text).await,
            Inbound::SpeechDone => self.machine.on_speech_done().await,
            Inbound::Presence { count } => self.machine.on_presence(count).await,
            Inbound::GazeTarget { az, el } => self.machine.on_gaze(az, el),
        }
    }

    /// Wire form of an outbound notice: topic and JSON body.
    pub fn encode(message: &Outbound) -> (&'static str, String) {
        let topic = match message {
            Outbound::StateChanged { .. } => topics::CORE_STATE,
            Outbound::ActiveEmotion(_) => topics::CORE_EMOTION,
            Outbound::DialogueQuery { .. } => topics::DIALOGUE_QUERY,
            Outbound::SpeechRequest { .. } => topics::TTS_SAY,
            Outbound::PoseCommand { .. } => topics::ACTUATE_POSE,
            Outbound::LightCommand { .. } => topics::ACTUATE_LIGHT,
        };
        (topic, message.payload().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumiwink_core::{EmotionRequest, Phase};

    #[test]
    fn test_decode_payloadless_topics() {
        assert_eq!(Inbound::decode(topics::AUDIO_AWAKE, b""), Ok(Inbound::Wake));
        assert_eq!(Inbound::decode(topics::TTS_DONE, b"{}"), Ok(Inbound::SpeechDone));
        // Garbage body on a payload-less topic still counts
        assert_eq!(Inbound::decode(topics::AUDIO_AWAKE, b"\xff{"), Ok(Inbound::Wake));
    }

    #[test]
    fn test_decode_stt() {
        let event = Inbound::decode(topics::AUDIO_STT, br#"{"text":"hi","speaker":"ana"}"#);
        assert_eq!(
            event,
            Ok(Inbound::SpeechDetected {
                text: "hi".into(),
                speaker: Some("ana".into())
            })
        );

        let event = Inbound::decode(topics::AUDIO_STT, br#"{"speaker":7}"#);
        assert_eq!(
            event,
            Ok(Inbound::SpeechDetected {
                text: String::new(),
                speaker: None
            })
        );

        assert_eq!(
            Inbound::decode(topics::AUDIO_STT, br#"{"text":["no"]}"#),
            Err(DispatchError::WrongType("text"))
        );
    }

    #[test]
    fn test_decode_presence_coercion() {
        fn count(body: &[u8]) -> Option<i64> {
            match Inbound::decode(topics::VISION_PRESENCE, body) {
                Ok(Inbound::Presence { count }) => Some(count),
                _ => None,
            }
        }
        assert_eq!(count(br#"{"count":2}"#), Some(2));
        assert_eq!(count(br#"{"count":"3"}"#), Some(3));
        assert_eq!(count(br#"{"count":1.9}"#), Some(1));
        assert_eq!(count(br#"{}"#), Some(0));
        assert_eq!(count(br#"{"count":"many"}"#), None);
        assert_eq!(count(br#"{"count":null}"#), None);
    }

    #[test]
    fn test_decode_gaze() {
        assert_eq!(
            Inbound::decode(topics::VISION_TARGET, br#"{"az":15.0,"el":"2"}"#),
            Ok(Inbound::GazeTarget { az: 15.0, el: 2.0 })
        );
        assert_eq!(
            Inbound::decode(topics::VISION_TARGET, br#"{"az":15.0}"#),
            Err(DispatchError::MissingField("el"))
        );
        assert!(matches!(
            Inbound::decode(topics::VISION_TARGET, br#"{"az":"left","el":0}"#),
            Err(DispatchError::NotANumber { field: "az", .. })
        ));
        assert!(matches!(
            Inbound::decode(topics::VISION_TARGET, br#"{"az":"NaN","el":0}"#),
            Err(DispatchError::NotANumber { field: "az", .. })
        ));
    }

    #[test]
    fn test_decode_unknown_topic() {
        assert_eq!(
            Inbound::decode("vision/faces", b"{}"),
            Err(DispatchError::UnknownTopic("vision/faces".into()))
        );
    }

    #[test]
    fn test_encode_topics() {
        let (topic, body) = Dispatcher::encode(&Outbound::StateChanged {
            state: Phase::Attend,
            prev: Phase::Idle,
        });
        assert_eq!(topic, topics::CORE_STATE);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json, serde_json::json!({"state": "attend", "prev": "idle"}));

        let (topic, _) =
            Dispatcher::encode(&Outbound::ActiveEmotion(EmotionRequest::neutral()));
        assert_eq!(topic, topics::CORE_EMOTION);

        let (topic, _) = Dispatcher::encode(&Outbound::SpeechRequest { text: "x".into() });
        assert_eq!(topic, topics::TTS_SAY);
    }
}
