//! # Core Module
//!
//! Configuration and shared message utilities.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add response module with message chunking utilities
//! - 1.0.0: Initial creation with config module

pub mod config;
pub mod response;

// Re-export commonly used items
pub use config::{BotConfig, BotData, BotDataHandle, Config};
pub use response::{chunk_message, truncate_for_message, CHUNK_MARGIN, MESSAGE_LIMIT};
