//! Environment configuration and reloadable bot data
//!
//! Two layers of configuration:
//! - [`Config`]: secrets and runtime knobs read once from the environment.
//! - [`BotData`]: the operator-editable `bot_data.json` document (witty
//!   responses, welcome templates, channel/user ids, AI settings). Created
//!   with defaults when missing and reloadable at runtime via `/reload`.
//!
//! - **Version**: 1.2.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.2.0: AI trigger settings moved into `bot_config`
//! - 1.1.0: Hot reload support
//! - 1.0.0: Initial env + JSON configuration

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-level configuration read from the environment at startup
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub openai_api_key: String,
    pub openai_model: String,
    /// When set, slash commands register per-guild (instant) instead of globally
    pub discord_guild_id: Option<String>,
    pub log_level: String,
    pub bot_data_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            discord_token: std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN must be set (bot token from the developer portal)")?,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .context("OPENAI_API_KEY must be set")?,
            openai_model: std::env::var("OPENAI_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            discord_guild_id: std::env::var("DISCORD_GUILD_ID").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            bot_data_path: std::env::var("BOT_DATA_PATH")
                .unwrap_or_else(|_| "bot_data.json".to_string()),
        })
    }
}

/// Channel/user ids, reaction lists and AI settings from `bot_data.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub samu_user_id: u64,
    pub welcome_channel_id: u64,
    pub confession_channel_id: u64,
    pub samu_tag_reactions: Vec<String>,
    pub general_reactions: Vec<String>,
    pub write_command_user_id: u64,
    pub write_command_channel_id: u64,
    pub general_channel_id: u64,
    pub ai_trigger_phrase: String,
    pub ai_cooldown_minutes: u64,
    pub ai_max_prompt_chars: usize,
    pub ai_persona: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            samu_user_id: 0,
            welcome_channel_id: 0,
            confession_channel_id: 0,
            samu_tag_reactions: vec!["👋".into(), "😊".into(), "🎉".into()],
            general_reactions: vec![
                "😂".into(),
                "👍".into(),
                "🤔".into(),
                "😎".into(),
                "🔥".into(),
                "✨".into(),
            ],
            write_command_user_id: 0,
            write_command_channel_id: 0,
            general_channel_id: 0,
            ai_trigger_phrase: "oh kp baa".to_string(),
            ai_cooldown_minutes: 5,
            ai_max_prompt_chars: 500,
            ai_persona: "You are KP baa, a grumpy but warm-hearted Nepali grandfather. \
                         Answer briefly, in plain language, with the occasional Nepali phrase."
                .to_string(),
        }
    }
}

/// The full operator-editable data document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotData {
    pub witty_responses: HashMap<String, Vec<String>>,
    pub welcome_messages: Vec<String>,
    pub bot_config: BotConfig,
}

impl Default for BotData {
    fn default() -> Self {
        let mut witty_responses = HashMap::new();
        let categories: [(&str, &[&str]); 6] = [
            ("hello", &["Hello there!", "Hi! How are you?", "Hey! What's up?"]),
            ("thanks", &["You're welcome!", "No problem!", "Glad to help!"]),
            ("good morning", &["Good morning!", "Morning! Have a great day!"]),
            ("good night", &["Good night!", "Sleep well!", "Sweet dreams!"]),
            ("lol", &["Glad I made you laugh!", "Haha!", "That's funny!"]),
            ("nice", &["Nice!", "Pretty cool!", "I agree!"]),
        ];
        for (word, responses) in categories {
            witty_responses.insert(
                word.to_string(),
                responses.iter().map(|s| s.to_string()).collect(),
            );
        }

        BotData {
            witty_responses,
            welcome_messages: vec![
                "Welcome {user} to the server!".into(),
                "Hey {user}, great to have you here!".into(),
                "{user} has joined the party!".into(),
                "Welcome aboard, {user}!".into(),
            ],
            bot_config: BotConfig::default(),
        }
    }
}

impl BotData {
    /// Load from `path`, writing a default document if the file is missing.
    ///
    /// A corrupt file is reported and replaced in memory (not on disk) by
    /// the defaults, so a typo in `bot_data.json` never keeps the bot down.
    pub async fn load_or_create(path: &str) -> Result<BotData> {
        if !Path::new(path).exists() {
            warn!("{path} not found, creating default configuration");
            let data = BotData::default();
            data.save(path).await?;
            return Ok(data);
        }

        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        match serde_json::from_str::<BotData>(&raw) {
            Ok(data) => {
                info!(
                    "Loaded {} trigger categories, {} welcome messages from {path}",
                    data.witty_responses.len(),
                    data.welcome_messages.len()
                );
                Ok(data)
            }
            Err(e) => {
                warn!("Error reading {path}: {e}. Falling back to defaults (file left untouched)");
                Ok(BotData::default())
            }
        }
    }

    pub async fn save(&self, path: &str) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, raw)
            .await
            .with_context(|| format!("failed to write {path}"))?;
        Ok(())
    }

    /// All configured trigger words
    pub fn trigger_words(&self) -> Vec<String> {
        self.witty_responses.keys().cloned().collect()
    }
}

/// Shared handle to the live [`BotData`], reloadable at runtime
#[derive(Clone)]
pub struct BotDataHandle {
    inner: Arc<RwLock<BotData>>,
    path: String,
}

impl BotDataHandle {
    pub fn new(data: BotData, path: String) -> Self {
        BotDataHandle {
            inner: Arc::new(RwLock::new(data)),
            path,
        }
    }

    pub async fn get(&self) -> BotData {
        self.inner.read().await.clone()
    }

    /// Re-read the document from disk, replacing the live copy.
    /// Returns (trigger category count, welcome message count).
    pub async fn reload(&self) -> Result<(usize, usize)> {
        let fresh = BotData::load_or_create(&self.path).await?;
        let counts = (fresh.witty_responses.len(), fresh.welcome_messages.len());
        *self.inner.write().await = fresh;
        info!("Bot data reloaded from {}", self.path);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bot_config_has_trigger_settings() {
        let config = BotConfig::default();
        assert_eq!(config.ai_trigger_phrase, "oh kp baa");
        assert_eq!(config.ai_cooldown_minutes, 5);
        assert_eq!(config.ai_max_prompt_chars, 500);
        assert!(!config.ai_persona.is_empty());
    }

    #[test]
    fn bot_data_round_trips_through_json() {
        let data = BotData::default();
        let raw = serde_json::to_string(&data).unwrap();
        let back: BotData = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.witty_responses.len(), data.witty_responses.len());
        assert_eq!(back.welcome_messages, data.welcome_messages);
        assert_eq!(back.bot_config.ai_trigger_phrase, data.bot_config.ai_trigger_phrase);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        // An operator file that only sets a couple of ids still parses;
        // everything else comes from the defaults.
        let raw = r#"{"bot_config": {"welcome_channel_id": 42}}"#;
        let data: BotData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.bot_config.welcome_channel_id, 42);
        assert_eq!(data.bot_config.ai_cooldown_minutes, 5);
        assert_eq!(
            data.witty_responses.len(),
            BotData::default().witty_responses.len()
        );
    }

    #[tokio::test]
    async fn load_or_create_writes_defaults_for_missing_file() {
        let dir = std::env::temp_dir().join(format!("sathi_cfg_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("bot_data.json");
        let path_str = path.to_str().unwrap();

        let data = BotData::load_or_create(path_str).await.unwrap();
        assert!(!data.witty_responses.is_empty());
        assert!(path.exists());

        // Second load reads the file we just wrote.
        let again = BotData::load_or_create(path_str).await.unwrap();
        assert_eq!(again.welcome_messages, data.welcome_messages);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn reload_picks_up_edits() {
        let dir = std::env::temp_dir().join(format!("sathi_cfg_{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("bot_data.json");
        let path_str = path.to_str().unwrap().to_string();

        let data = BotData::load_or_create(&path_str).await.unwrap();
        let handle = BotDataHandle::new(data, path_str.clone());

        let mut edited = handle.get().await;
        edited.bot_config.general_channel_id = 777;
        edited.save(&path_str).await.unwrap();

        handle.reload().await.unwrap();
        assert_eq!(handle.get().await.bot_config.general_channel_id, 777);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
