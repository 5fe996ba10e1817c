//! # Features Layer
//!
//! Each submodule is one user-facing capability. Feature modules never
//! talk to each other directly; the message router and the command layer
//! wire them together.

pub mod ai;
pub mod moderation;
pub mod music;
pub mod welcome;
pub mod witty;

// Re-export the items the application layer uses most
pub use ai::{AiDispatcher, AiSettings, CooldownLedger, OpenAiChat};
pub use music::{Players, YtDlpResolver};
