//! AI query dispatcher
//!
//! Orchestrates the trigger-phrase message path: classify the intent,
//! enforce the per-user cooldown, call the chat model, and chunk the
//! answer for delivery. The dispatcher itself performs no Discord I/O;
//! it returns an [`Outcome`] that the message router executes, which
//! keeps the whole decision pipeline testable with a fake model.
//!
//! - **Version**: 1.1.0
//! - **Since**: 0.6.0
//!
//! ## Changelog
//! - 1.1.0: Cooldown is consumed before the model call, not after
//! - 1.0.0: Initial trigger-phrase handling

use log::{debug, info, warn};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::config::BotConfig;
use crate::core::response::{chunk_message, CHUNK_MARGIN, MESSAGE_LIMIT};
use crate::features::ai::chat::ChatModel;
use crate::features::ai::cooldown::CooldownLedger;
use crate::features::ai::intent::{classify, Intent, ModAction};

/// Reloadable per-message settings, extracted from the live bot data
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub trigger_phrase: String,
    pub persona: String,
    pub max_prompt_chars: usize,
}

impl From<&BotConfig> for AiSettings {
    fn from(config: &BotConfig) -> Self {
        AiSettings {
            trigger_phrase: config.ai_trigger_phrase.clone(),
            persona: config.ai_persona.clone(),
            max_prompt_chars: config.ai_max_prompt_chars,
        }
    }
}

/// What the router should do with a message
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Not addressed to the bot
    Ignore,
    /// Hand off to the moderation collaborator
    Moderate {
        action: ModAction,
        target_user_id: u64,
        reason: String,
    },
    /// Send these chunks, in order; the first one as a reply to the
    /// triggering message
    Reply(Vec<String>),
}

pub struct AiDispatcher {
    ledger: CooldownLedger,
    model: Arc<dyn ChatModel>,
}

impl AiDispatcher {
    pub fn new(ledger: CooldownLedger, model: Arc<dyn ChatModel>) -> Self {
        AiDispatcher { ledger, model }
    }

    pub fn cooldown(&self) -> &CooldownLedger {
        &self.ledger
    }

    /// Run one message through the pipeline. `is_privileged` callers skip
    /// the cooldown entirely; the ledger itself has no privilege concept.
    pub async fn dispatch(
        &self,
        text: &str,
        user_id: u64,
        is_privileged: bool,
        settings: &AiSettings,
    ) -> Outcome {
        let prompt = match classify(text, &settings.trigger_phrase) {
            Intent::None => return Outcome::Ignore,
            Intent::Moderate {
                action,
                target_user_id,
                reason,
            } => {
                return Outcome::Moderate {
                    action,
                    target_user_id,
                    reason,
                }
            }
            Intent::AskAi { prompt } => prompt,
        };

        let request_id = Uuid::new_v4();
        info!(
            "[{request_id}] AI query | User: {user_id} | Privileged: {is_privileged} | Prompt: '{}'",
            prompt.chars().take(80).collect::<String>()
        );

        if prompt.is_empty() {
            debug!("[{request_id}] Empty prompt, replying with usage hint");
            return Outcome::Reply(vec![format!(
                "Say `{} <question>` and I will answer.",
                settings.trigger_phrase
            )]);
        }

        // Length check comes before the cooldown so an over-long prompt
        // never spends the user's window.
        if prompt.chars().count() > settings.max_prompt_chars {
            debug!("[{request_id}] Prompt over {} chars, rejected", settings.max_prompt_chars);
            return Outcome::Reply(vec![format!(
                "That is too long for these old ears. Keep it under {} characters.",
                settings.max_prompt_chars
            )]);
        }

        if !is_privileged {
            // Check-and-record in one step: the window is spent now, before
            // the model call, so a slow upstream cannot let the same user
            // queue up a burst inside one window.
            if let Err(remaining) = self.ledger.check_and_record(user_id) {
                info!("[{request_id}] Cooldown active for user {user_id}, {remaining}s left");
                return Outcome::Reply(vec![format!(
                    "Bistarai! Ask me again in {}.",
                    self.ledger.remaining_display(user_id)
                )]);
            }
        }

        match self.model.complete(&settings.persona, &prompt).await {
            Ok(answer) => {
                info!("[{request_id}] Model answered with {} chars", answer.len());
                Outcome::Reply(chunk_message(&answer, MESSAGE_LIMIT - CHUNK_MARGIN))
            }
            Err(e) => {
                warn!("[{request_id}] Model call failed: {e}");
                Outcome::Reply(vec![
                    "My head is not working right now. Ask me again later, hai?".to_string(),
                ])
            }
        }
    }
}
