//! Device behavioral state
//!
//! The device moves through a closed set of phases:
//! `idle → attend → listen → think → speak → reflect → idle`, plus `sleep`
//! which is entered from `idle` after a long stretch without anyone around.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::time::Instant;

/// One of the seven behavioral phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Attend,
    Listen,
    Think,
    Speak,
    Reflect,
    Sleep,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Idle,
        Phase::Attend,
        Phase::Listen,
        Phase::Think,
        Phase::Speak,
        Phase::Reflect,
        Phase::Sleep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Attend => "attend",
            Phase::Listen => "listen",
            Phase::Think => "think",
            Phase::Speak => "speak",
            Phase::Reflect => "reflect",
            Phase::Sleep => "sleep",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown device phase: {0}")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownPhase(s.to_string()))
    }
}

/// The single per-orchestrator device state record.
///
/// Only the state machine mutates it; everything else sees snapshots.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub phase: Phase,
    /// When `phase` last changed
    pub last_transition: Instant,
    /// Last wake word or recognized speech
    pub last_user_activity: Instant,
    /// Identifier of the reply currently being spoken, if any
    pub current_reply_id: Option<String>,
}

impl DeviceState {
    pub fn new(now: Instant) -> Self {
        Self {
            phase: Phase::Idle,
            last_transition: now,
            last_user_activity: now,
            current_reply_id: None,
        }
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}
