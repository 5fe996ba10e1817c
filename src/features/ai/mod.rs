//! # AI Query Feature
//!
//! Trigger-phrase natural-language queries with per-user cooldowns.
//! Classification decides between "answer a question" and "perform a
//! moderation action"; answers are chunked under the Discord message
//! limit.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.6.0
//! - **Toggleable**: false

pub mod chat;
pub mod cooldown;
pub mod dispatcher;
pub mod intent;

pub use chat::{AiError, ChatModel, OpenAiChat};
pub use cooldown::CooldownLedger;
pub use dispatcher::{AiDispatcher, AiSettings, Outcome};
pub use intent::{classify, Intent, ModAction};
