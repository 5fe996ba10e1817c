use anyhow::Result;
use dotenvy::dotenv;
use log::{error, info};
use serenity::async_trait;
use serenity::http::Http;
use serenity::model::application::interaction::{Interaction, InteractionResponseType};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::guild::Member;
use serenity::model::id::GuildId;
use serenity::prelude::*;
use songbird::SerenityInit;
use std::sync::Arc;
use std::time::Duration;

use sathi::commands::{self, CommandContext};
use sathi::core::config::{BotData, BotDataHandle, Config};
use sathi::features::ai::{AiDispatcher, CooldownLedger, OpenAiChat};
use sathi::features::music::{
    spawn_event_loop, HttpAnnouncer, PlayerConfig, Players, SongbirdTransport, YtDlpResolver,
};
use sathi::features::welcome;
use sathi::message_router::MessageRouter;

struct Handler {
    router: MessageRouter,
    command_context: Arc<CommandContext>,
    bot_data: BotDataHandle,
    guild_id: Option<GuildId>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        if let Err(e) = self.router.handle_message(&ctx, &msg).await {
            error!("Error handling message: {e:#}");
            if let Err(why) = msg
                .channel_id
                .say(&ctx.http, "Sorry, something went wrong with that message.")
                .await
            {
                error!("Failed to send error message: {why}");
            }
        }
    }

    async fn guild_member_addition(&self, ctx: Context, new_member: Member) {
        info!(
            "New member joined: {} (ID: {})",
            new_member.user.name, new_member.user.id
        );

        let data = self.bot_data.get().await;
        let Some(guild) = ctx.cache.guild(new_member.guild_id) else {
            return;
        };
        let Some(channel) =
            welcome::pick_welcome_channel(&guild, data.bot_config.welcome_channel_id)
        else {
            return;
        };

        let mention = format!("<@{}>", new_member.user.id.0);
        let greeting = welcome::render_welcome(&data.welcome_messages, &mention);
        if let Err(e) = channel.say(&ctx.http, greeting).await {
            error!("Failed to send welcome message: {e}");
        }
    }

    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🎉 {} is connected and ready!", ready.user.name);
        info!("📡 Connected to {} guilds", ready.guilds.len());
        info!("🤖 Bot ID: {}", ready.user.id);

        // Guild commands update instantly and are used in development;
        // global registration can take up to an hour to propagate.
        if let Some(guild_id) = self.guild_id {
            info!("🔧 Development mode: registering commands for guild {guild_id}");
            if let Err(e) = commands::register_guild_commands(&ctx, guild_id).await {
                error!("❌ Failed to register guild slash commands: {e:#}");
            }
        } else {
            info!("🌍 Production mode: registering commands globally");
            if let Err(e) = commands::register_global_commands(&ctx).await {
                error!("❌ Failed to register global slash commands: {e:#}");
            }
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::ApplicationCommand(command) = interaction else {
            return;
        };

        if let Err(e) =
            commands::handle_slash_command(self.command_context.clone(), &ctx, &command).await
        {
            error!(
                "Error handling slash command '{}': {e:#}",
                command.data.name
            );

            let error_message = "❌ Sorry, something went wrong with that command.";

            // The handler may have deferred already; try to edit first,
            // fall back to a fresh response.
            #[allow(clippy::redundant_pattern_matching)]
            if let Err(_) = command
                .edit_original_interaction_response(&ctx.http, |response| {
                    response.content(error_message)
                })
                .await
            {
                let _ = command
                    .create_interaction_response(&ctx.http, |response| {
                        response
                            .kind(InteractionResponseType::ChannelMessageWithSource)
                            .interaction_response_data(|message| message.content(error_message))
                    })
                    .await;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::from_env()?;

    // The openai crate reads its key from the environment.
    std::env::set_var("OPENAI_API_KEY", &config.openai_api_key);
    std::env::set_var("OPENAI_KEY", &config.openai_api_key);

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    info!("Starting Sathi...");

    let bot_data = BotData::load_or_create(&config.bot_data_path).await?;
    let cooldown = Duration::from_secs(bot_data.bot_config.ai_cooldown_minutes * 60);
    let bot_data = BotDataHandle::new(bot_data, config.bot_data_path.clone());

    let model = Arc::new(OpenAiChat::new(config.openai_model.clone()));
    let dispatcher = Arc::new(AiDispatcher::new(CooldownLedger::new(cooldown), model));

    // Player notices go out over a plain HTTP client; the gateway client
    // gets its own instance of the same token below.
    let http = Arc::new(Http::new(&config.discord_token));

    // We keep our own handle on the voice manager so the transport can
    // drive it directly.
    let manager = songbird::Songbird::serenity();
    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let transport = Arc::new(SongbirdTransport::new(manager.clone(), events_tx));
    let players = Arc::new(Players::new(
        Arc::new(YtDlpResolver::new()),
        transport,
        Arc::new(HttpAnnouncer::new(http)),
        PlayerConfig::default(),
    ));
    spawn_event_loop(players.clone(), events_rx);

    let command_context = Arc::new(CommandContext::new(
        bot_data.clone(),
        players,
        dispatcher.clone(),
    ));
    let router = MessageRouter::new(bot_data.clone(), dispatcher);

    // Parse guild ID if provided for development mode
    let guild_id = config
        .discord_guild_id
        .as_ref()
        .and_then(|id| id.parse::<u64>().ok())
        .map(GuildId);

    let handler = Handler {
        router,
        command_context,
        bot_data,
        guild_id,
    };

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await
        .map_err(|e| {
            error!("Failed to create Discord client: {e}");
            anyhow::anyhow!("client creation failed: {}", e)
        })?;

    info!("Bot configured successfully. Connecting to Discord gateway...");

    if let Err(why) = client.start().await {
        error!("Gateway connection failed: {why:?}");
        return Err(anyhow::anyhow!(
            "failed to establish gateway connection: {}",
            why
        ));
    }

    Ok(())
}
