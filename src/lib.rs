// Core layer - shared types and configuration
pub mod core;

// Features layer - all feature modules
pub mod features;

// Application layer
pub mod commands;
pub mod message_router;

// Re-export core config for convenience
pub use crate::core::Config;

// Re-export feature items used by the binary
pub use features::{
    // AI queries
    AiDispatcher, AiSettings, CooldownLedger, OpenAiChat,
    // Music playback
    Players, YtDlpResolver,
};
