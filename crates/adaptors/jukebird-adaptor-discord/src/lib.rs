//! Discord adapter
//!
//! Connects Jukebird to the Discord gateway via serenity. Messages are
//! parsed by the command registry and replies go back to the channel the
//! command came from; everything stateful lives in the core crate behind
//! the [`jukebird_core::BotContext`].

use jukebird_core::{
    AudioCatalog, BotConfig, BotContext, CatalogResolver, ChannelRef, ClipResolver, GroupId,
    JukebirdError, Responses, Result, SettingsStore, VoiceBackend,
};
use serenity::async_trait as serenity_async_trait;
use serenity::builder::EditMember;
use serenity::model::channel::Message as DiscordMessage;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{ChannelId, GuildId, UserId};
use serenity::prelude::*;
use std::sync::Arc;
use tracing::{info, warn};

pub mod commands;
pub mod voice;

pub use commands::{default_registry, CommandRegistry, CommandState, PlatformActions};
pub use voice::NullBackend;
#[cfg(feature = "voice")]
pub use voice::SongbirdBackend;

#[cfg(feature = "voice")]
use songbird::serenity::SerenityInit;
#[cfg(feature = "voice")]
use songbird::Songbird;

/// Gateway-level configuration.
#[derive(Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub intents: GatewayIntents,
}

impl DiscordConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: GatewayIntents::GUILDS
                | GatewayIntents::GUILD_MESSAGES
                | GatewayIntents::MESSAGE_CONTENT
                | GatewayIntents::GUILD_VOICE_STATES,
        }
    }
}

/// [`PlatformActions`] backed by the serenity HTTP client.
struct SerenityActions {
    http: Arc<serenity::http::Http>,
}

#[serenity_async_trait]
impl PlatformActions for SerenityActions {
    async fn move_user(&self, group: GroupId, user: u64, channel: ChannelRef) -> Result<()> {
        GuildId::new(group.0)
            .edit_member(
                &self.http,
                UserId::new(user),
                EditMember::new().voice_channel(ChannelId::new(channel.0)),
            )
            .await
            .map(|_| ())
            .map_err(|e| JukebirdError::Transport(format!("cannot move user into voice: {e}")))
    }
}

struct Handler {
    context: Arc<BotContext>,
    registry: Arc<CommandRegistry>,
    state: Arc<CommandState>,
}

#[serenity_async_trait]
impl serenity::prelude::EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: DiscordMessage) {
        if msg.author.bot {
            return;
        }
        // commands only work inside a guild
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let group = GroupId(guild_id.get());

        // cache guard must not live across an await
        let voice_channel: Option<ChannelRef> = msg.guild(&ctx.cache).and_then(|guild| {
            guild
                .voice_states
                .get(&msg.author.id)
                .and_then(|state| state.channel_id)
                .map(|id| ChannelRef(id.get()))
        });

        let platform: Arc<dyn PlatformActions> = Arc::new(SerenityActions {
            http: Arc::clone(&ctx.http),
        });
        let Some(reply) = self
            .registry
            .dispatch(
                &msg.content,
                group,
                voice_channel,
                msg.author.id.get(),
                Arc::clone(&self.context),
                Arc::clone(&self.state),
                platform,
            )
            .await
        else {
            return;
        };

        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            warn!(guild_id = %guild_id, error = %e, "cannot send command reply");
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "discord gateway ready"
        );
    }
}

/// Builds the bot context, connects to the gateway and runs until the
/// connection terminates.
pub async fn start_discord(
    discord: DiscordConfig,
    config: BotConfig,
    catalog: Arc<AudioCatalog>,
    responses: Arc<Responses>,
    settings: Arc<SettingsStore>,
) -> Result<()> {
    let resolver: Arc<dyn ClipResolver> = Arc::new(CatalogResolver::new(Arc::clone(&catalog)));

    #[cfg(feature = "voice")]
    let songbird = Songbird::serenity();
    #[cfg(feature = "voice")]
    let backend: Arc<dyn VoiceBackend> = Arc::new(SongbirdBackend::new(
        Arc::clone(&songbird),
        Arc::clone(&resolver),
    ));
    #[cfg(not(feature = "voice"))]
    let backend: Arc<dyn VoiceBackend> = {
        warn!("voice feature disabled, audio playback is a no-op");
        Arc::new(NullBackend::new(Arc::clone(&resolver)))
    };

    let prefix = config.command_prefix.clone();
    let context = BotContext::initialize(config, catalog, responses, settings, backend)?;
    let handler = Handler {
        context,
        registry: Arc::new(default_registry(&prefix)),
        state: Arc::new(CommandState::new()),
    };

    let builder = Client::builder(&discord.token, discord.intents).event_handler(handler);
    #[cfg(feature = "voice")]
    let builder = builder.register_songbird_with(songbird);

    let mut client = builder
        .await
        .map_err(|e| JukebirdError::Transport(format!("cannot build discord client: {e}")))?;
    info!("starting discord gateway");
    client
        .start()
        .await
        .map_err(|e| JukebirdError::Transport(format!("discord gateway terminated: {e}")))
}
