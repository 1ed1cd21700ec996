//! # LumiWink Affect
//!
//! Decides which emotion overlay is showing.
//!
//! ## Architecture
//!
//! - [`EmotionEngine`]: one active overlay, a pending FIFO, per-name rate
//!   limits, priority preemption
//! - [`Watchdog`]: background task that expires the active overlay once its
//!   TTL has elapsed and promotes the next one
//!
//! Both share the engine's single mutex; every `active-emotion` notice is
//! published after that lock is released.

mod engine;
mod watchdog;

pub use engine::{EmitOutcome, EmotionEngine, EngineSnapshot};
pub use watchdog::{Watchdog, WatchdogConfig};
