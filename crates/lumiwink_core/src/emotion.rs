//! Emotion requests and their priority ordering
//!
//! An emotion is a short-lived expressive overlay. Renderers (eyes, brows,
//! aura light, haptics) each interpret `name` + `intensity` on their own;
//! the core only decides which overlay is active.

use serde::Serialize;
use std::time::Duration;

/// Fixed total ordering of known emotion names, most urgent first.
pub const PRIORITY: [&str; 13] = [
    "surprised",
    "apologetic",
    "annoyed",
    "proud",
    "excited",
    "happy",
    "encouraging",
    "curious",
    "concerned",
    "confident",
    "focused",
    "calm",
    "neutral",
];

/// TTL used when neither the caller nor the config gives one.
pub const FALLBACK_TTL_MS: u64 = 2000;

/// Intensity used when the caller does not pass one.
pub const DEFAULT_INTENSITY: f64 = 0.7;

/// Priority rank of an emotion name. Lower is more urgent.
///
/// Names outside [`PRIORITY`] rank below every known name, including
/// `neutral`, so they never preempt anything.
pub fn priority_of(name: &str) -> usize {
    PRIORITY
        .iter()
        .position(|p| *p == name)
        .unwrap_or(PRIORITY.len())
}

/// An immutable request to show an emotion.
///
/// Serializes to the `active-emotion` payload: `{name, intensity, ttl_ms}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionRequest {
    pub name: String,
    /// Nominally in [0, 1]; not clamped here
    pub intensity: f64,
    pub ttl_ms: u64,
}

impl EmotionRequest {
    pub fn new(name: impl Into<String>, intensity: f64, ttl_ms: u64) -> Self {
        Self {
            name: name.into(),
            intensity,
            ttl_ms,
        }
    }

    /// The rest overlay shown when nothing else is pending.
    pub fn neutral() -> Self {
        Self::new("neutral", 0.5, 1500)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn priority(&self) -> usize {
        priority_of(&self.name)
    }

    /// Whether `self` strictly outranks `other`.
    pub fn outranks(&self, other: &EmotionRequest) -> bool {
        self.priority() < other.priority()
    }
}
