//! Shared context for command handlers

use std::sync::Arc;

use crate::core::config::BotDataHandle;
use crate::features::ai::dispatcher::AiDispatcher;
use crate::features::music::Players;

/// The services every slash command handler may need
#[derive(Clone)]
pub struct CommandContext {
    pub bot_data: BotDataHandle,
    pub players: Arc<Players>,
    pub dispatcher: Arc<AiDispatcher>,
    pub start_time: std::time::Instant,
}

impl CommandContext {
    pub fn new(
        bot_data: BotDataHandle,
        players: Arc<Players>,
        dispatcher: Arc<AiDispatcher>,
    ) -> Self {
        CommandContext {
            bot_data,
            players,
            dispatcher,
            start_time: std::time::Instant::now(),
        }
    }
}
