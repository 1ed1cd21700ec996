//! # LumiWink Orchestrator
//!
//! The behavioral core of the device:
//!
//! ```text
//! bus message ─▶ Dispatcher ─▶ StateMachine ─▶ EmotionEngine ─▶ Publisher
//!                                   │                ▲
//!                                   └──▶ Publisher   └── Watchdog (TTL)
//! ```
//!
//! [`Dispatcher`] is the only component that knows topic names.
//! [`Orchestrator`] owns the background loops and their shutdown.

mod dispatch;
mod machine;
mod runtime;

pub use dispatch::{topics, DispatchError, Dispatcher, Inbound};
pub use machine::StateMachine;
pub use runtime::Orchestrator;
