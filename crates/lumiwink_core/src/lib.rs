//! # LumiWink Core
//!
//! Shared vocabulary for the orchestrator crates:
//!
//! - [`Phase`] / [`DeviceState`]: the behavioral state of the device
//! - [`EmotionRequest`] and the fixed [`PRIORITY`] ordering
//! - [`Outbound`]: every notification the core can produce, plus the
//!   fire-and-forget [`Publisher`] seam the transport plugs into
//! - [`LumiConfig`]: the read-only configuration snapshot

pub mod bus;
pub mod config;
pub mod emotion;
pub mod state;

pub use bus::{ChannelPublisher, Outbound, Publisher};
pub use config::{EmotionProfile, LumiConfig, OrchestratorConfig, RateLimit};
pub use emotion::{priority_of, EmotionRequest, DEFAULT_INTENSITY, FALLBACK_TTL_MS, PRIORITY};
pub use state::{DeviceState, Phase, UnknownPhase};
