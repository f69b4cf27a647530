//! Chat commands
//!
//! Every command is registered explicitly by name in a [`CommandRegistry`];
//! dispatch is a plain map lookup on the first word after the prefix, and
//! each handler returns the reply text. No command touches serenity types,
//! so the whole layer is testable against the null backend.

use async_trait::async_trait;
use jukebird_core::responses::response_data;
use jukebird_core::{BotContext, ChannelRef, GroupId, SettingsStore, Track, TrackEventListener, VoiceSession};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Boxed async command handler, resolved at dispatch time.
pub type CommandHandler =
    Box<dyn Fn(CommandInvocation) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

/// Platform operations a command may need beyond voice playback.
/// Keeps the handlers free of serenity types.
#[async_trait]
pub trait PlatformActions: Send + Sync {
    /// Moves a user into a voice channel. Fails when the user is not
    /// currently in voice.
    async fn move_user(
        &self,
        group: GroupId,
        user: u64,
        channel: ChannelRef,
    ) -> jukebird_core::Result<()>;
}

/// Everything a handler needs about one command message.
pub struct CommandInvocation {
    /// Guild the message came from
    pub group: GroupId,
    /// Voice channel the invoking user is in, if any
    pub channel: Option<ChannelRef>,
    /// User who sent the message
    pub user: u64,
    /// Arguments after the command name
    pub args: Vec<String>,
    pub context: Arc<BotContext>,
    pub state: Arc<CommandState>,
    pub platform: Arc<dyn PlatformActions>,
}

/// Adaptor-side state the handlers share across invocations.
pub struct CommandState {
    /// Groups whose session already carries the loop listener
    looped: parking_lot::Mutex<HashSet<GroupId>>,
}

impl CommandState {
    pub fn new() -> Self {
        Self {
            looped: parking_lot::Mutex::new(HashSet::new()),
        }
    }

    /// Marks the group's loop listener as installed. `true` on first call.
    fn mark_looped(&self, group: GroupId) -> bool {
        self.looped.lock().insert(group)
    }
}

impl Default for CommandState {
    fn default() -> Self {
        Self::new()
    }
}

/// Name-to-handler map with a fixed prefix.
pub struct CommandRegistry {
    prefix: String,
    handlers: HashMap<String, CommandHandler>,
}

impl CommandRegistry {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            handlers: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(CommandInvocation) -> Pin<Box<dyn Future<Output = String> + Send>>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(name.to_string(), Box::new(handler));
    }

    pub fn command_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Parses and runs a message. `None` when the message is not a command
    /// at all; unknown commands still produce a reply.
    #[allow(clippy::too_many_arguments)]
    pub async fn dispatch(
        &self,
        content: &str,
        group: GroupId,
        channel: Option<ChannelRef>,
        user: u64,
        context: Arc<BotContext>,
        state: Arc<CommandState>,
        platform: Arc<dyn PlatformActions>,
    ) -> Option<String> {
        let rest = content.strip_prefix(self.prefix.as_str())?;
        let mut words = rest.split_whitespace();
        let name = words.next()?;
        let args: Vec<String> = words.map(str::to_string).collect();

        debug!(group = %group, command = %name, "dispatching command");
        match self.handlers.get(name) {
            Some(handler) => {
                let invocation = CommandInvocation {
                    group,
                    channel,
                    user,
                    args,
                    context,
                    state,
                    platform,
                };
                Some(handler(invocation).await)
            }
            None => Some(
                context
                    .responses
                    .render("unknown_command", &response_data([("command", name)])),
            ),
        }
    }
}

/// Replays the group's designated clip whenever a track ends on its own.
struct LoopListener {
    group: GroupId,
    session: Weak<VoiceSession>,
    settings: Arc<SettingsStore>,
}

impl TrackEventListener for LoopListener {
    fn on_track_end(&self, _track: &Track, may_start_next: bool) {
        if !may_start_next {
            return;
        }
        let Some(clip) = self.settings.get(self.group).designated_clip else {
            return;
        };
        let Some(session) = self.session.upgrade() else {
            return;
        };
        debug!(group = %self.group, clip = %clip, "track ended naturally, replaying designated clip");
        tokio::spawn(async move {
            session.play(&clip).await;
        });
    }
}

/// Builds the registry with the standard command set.
pub fn default_registry(prefix: &str) -> CommandRegistry {
    let mut registry = CommandRegistry::new(prefix);
    registry.register("play", |inv| Box::pin(cmd_play(inv)));
    registry.register("play_with", |inv| Box::pin(cmd_play_with(inv)));
    registry.register("stop", |inv| Box::pin(cmd_stop(inv)));
    registry.register("pause", |inv| Box::pin(cmd_pause(inv)));
    registry.register("resume", |inv| Box::pin(cmd_resume(inv)));
    registry.register("connect", |inv| Box::pin(cmd_connect(inv)));
    registry.register("disconnect", |inv| Box::pin(cmd_disconnect(inv)));
    registry.register("reset", |inv| Box::pin(cmd_reset(inv)));
    registry.register("set", |inv| Box::pin(cmd_set(inv)));
    registry.register("sounds", |inv| Box::pin(cmd_sounds(inv)));

    let mut names = registry.command_names();
    names.push("help".to_string());
    names.sort();
    let summary = names
        .iter()
        .map(|name| format!("{prefix}{name}"))
        .collect::<Vec<_>>()
        .join(", ");
    registry.register("help", move |inv| {
        let summary = summary.clone();
        Box::pin(async move {
            inv.context
                .responses
                .render("help", &response_data([("commands", summary.as_str())]))
        })
    });
    registry
}

/// Installs the loop listener on the group's session, once per group.
fn ensure_loop_listener(inv: &CommandInvocation, session: &Arc<VoiceSession>) {
    if inv.state.mark_looped(inv.group) {
        session.add_listener(Arc::new(LoopListener {
            group: inv.group,
            session: Arc::downgrade(session),
            settings: Arc::clone(&inv.context.settings),
        }));
    }
}

async fn cmd_play(inv: CommandInvocation) -> String {
    let Some(locator) = inv.args.first().cloned() else {
        return inv.context.responses.render_plain("play.missing_arg");
    };

    let session = inv.context.voice.get_or_create(inv.group).await;
    ensure_loop_listener(&inv, &session);

    if !session.is_connected().await {
        let target = inv
            .channel
            .or_else(|| inv.context.settings.get(inv.group).designated_channel);
        if let Some(channel) = target {
            session.connect(channel, false).await;
        }
    }

    session.play(&locator).await;
    inv.context
        .responses
        .render("play.requested", &response_data([("clip", locator.as_str())]))
}

/// Pulls the invoking user into the designated channel and starts the
/// designated clip there on loop.
async fn cmd_play_with(inv: CommandInvocation) -> String {
    let settings = inv.context.settings.get(inv.group);
    let Some(channel) = settings.designated_channel else {
        return inv.context.responses.render_plain("connect.no_channel");
    };
    let Some(clip) = settings.designated_clip else {
        return inv.context.responses.render_plain("play_with.no_clip");
    };

    if let Err(e) = inv.platform.move_user(inv.group, inv.user, channel).await {
        debug!(group = %inv.group, user = inv.user, error = %e, "cannot move user into voice");
        return inv.context.responses.render(
            "play_with.not_in_voice",
            &response_data([("channel", channel.to_string().as_str())]),
        );
    }

    let session = inv.context.voice.get_or_create(inv.group).await;
    ensure_loop_listener(&inv, &session);
    session.connect(channel, true).await;
    session.play(&clip).await;
    inv.context.responses.render_plain("play_with.done")
}

async fn cmd_stop(inv: CommandInvocation) -> String {
    if let Some(session) = inv.context.voice.get(inv.group).await {
        session.stop().await;
    }
    inv.context.responses.render_plain("stop.done")
}

async fn cmd_pause(inv: CommandInvocation) -> String {
    if let Some(session) = inv.context.voice.get(inv.group).await {
        session.set_paused(true).await;
    }
    inv.context.responses.render_plain("pause.done")
}

async fn cmd_resume(inv: CommandInvocation) -> String {
    if let Some(session) = inv.context.voice.get(inv.group).await {
        session.set_paused(false).await;
    }
    inv.context.responses.render_plain("resume.done")
}

async fn cmd_connect(inv: CommandInvocation) -> String {
    let explicit = inv.args.iter().find_map(|arg| arg.parse::<u64>().ok()).map(ChannelRef);
    let force = inv.args.iter().any(|arg| arg == "force");
    let target = explicit
        .or(inv.channel)
        .or_else(|| inv.context.settings.get(inv.group).designated_channel);
    let Some(channel) = target else {
        return inv.context.responses.render_plain("connect.no_channel");
    };

    let session = inv.context.voice.get_or_create(inv.group).await;
    if session.connect(channel, force).await {
        inv.context.responses.render(
            "connect.initiated",
            &response_data([("channel", channel.to_string().as_str())]),
        )
    } else {
        inv.context.responses.render_plain("connect.refused")
    }
}

async fn cmd_disconnect(inv: CommandInvocation) -> String {
    if let Some(session) = inv.context.voice.get(inv.group).await {
        session.disconnect().await;
    }
    inv.context.responses.render_plain("disconnect.done")
}

async fn cmd_reset(inv: CommandInvocation) -> String {
    let target = inv
        .context
        .settings
        .get(inv.group)
        .designated_channel
        .or(inv.channel);
    let Some(channel) = target else {
        return inv.context.responses.render_plain("reset.no_channel");
    };

    let session = inv.context.voice.get_or_create(inv.group).await;
    session.reset(channel);
    inv.context.responses.render_plain("reset.started")
}

async fn cmd_set(inv: CommandInvocation) -> String {
    let (Some(what), Some(value)) = (inv.args.first(), inv.args.get(1)) else {
        return inv.context.responses.render_plain("set.usage");
    };

    let result = match what.as_str() {
        "channel" => match value.parse::<u64>() {
            Ok(raw) => inv
                .context
                .settings
                .set_designated_channel(inv.group, ChannelRef(raw))
                .map(|()| {
                    inv.context
                        .responses
                        .render("set.channel", &response_data([("channel", value.as_str())]))
                }),
            Err(_) => return inv.context.responses.render_plain("set.usage"),
        },
        "clip" => inv
            .context
            .settings
            .set_designated_clip(inv.group, Some(value.clone()))
            .map(|()| {
                inv.context
                    .responses
                    .render("set.clip", &response_data([("clip", value.as_str())]))
            }),
        _ => return inv.context.responses.render_plain("set.usage"),
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            warn!(group = %inv.group, error = %e, "cannot persist settings");
            inv.context.responses.render_plain("set.failed")
        }
    }
}

async fn cmd_sounds(inv: CommandInvocation) -> String {
    let mut lines: Vec<String> = inv
        .context
        .catalog
        .clips()
        .map(|clip| {
            if clip.aliases.is_empty() {
                clip.id.clone()
            } else {
                format!("{} ({})", clip.id, clip.aliases.join(", "))
            }
        })
        .collect();
    if lines.is_empty() {
        return inv.context.responses.render_plain("sounds.empty");
    }
    lines.sort();
    inv.context.responses.render(
        "sounds.list",
        &response_data([("clips", lines.join("\n").as_str())]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::NullBackend;
    use jukebird_core::{
        AudioCatalog, BotConfig, CatalogResolver, ClipResolver, Responses, VoiceBackend,
    };
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Records move requests instead of talking to a gateway.
    struct FakeMover {
        moves: parking_lot::Mutex<Vec<(u64, ChannelRef)>>,
        fail: AtomicBool,
    }

    impl FakeMover {
        fn new() -> Self {
            Self {
                moves: parking_lot::Mutex::new(Vec::new()),
                fail: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl PlatformActions for FakeMover {
        async fn move_user(
            &self,
            _group: GroupId,
            user: u64,
            channel: ChannelRef,
        ) -> jukebird_core::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(jukebird_core::JukebirdError::Transport(
                    "user not in voice".into(),
                ));
            }
            self.moves.lock().push((user, channel));
            Ok(())
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        context: Arc<BotContext>,
        registry: CommandRegistry,
        state: Arc<CommandState>,
        mover: Arc<FakeMover>,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let catalog = catalog_with_clip(dir.path());
            let responses = Arc::new(Responses::from_map(test_templates()).unwrap());
            let settings =
                Arc::new(SettingsStore::open(dir.path().join("settings")).unwrap());
            let resolver: Arc<dyn ClipResolver> =
                Arc::new(CatalogResolver::new(Arc::clone(&catalog)));
            let backend: Arc<dyn VoiceBackend> = Arc::new(NullBackend::new(resolver));
            let context =
                BotContext::new(BotConfig::default(), catalog, responses, settings, backend);
            Self {
                _dir: dir,
                context,
                registry: default_registry("!"),
                state: Arc::new(CommandState::new()),
                mover: Arc::new(FakeMover::new()),
            }
        }

        async fn dispatch(&self, content: &str) -> Option<String> {
            self.registry
                .dispatch(
                    content,
                    GroupId(1),
                    Some(ChannelRef(5)),
                    7,
                    Arc::clone(&self.context),
                    Arc::clone(&self.state),
                    self.mover.clone() as Arc<dyn PlatformActions>,
                )
                .await
        }
    }

    fn catalog_with_clip(dir: &Path) -> Arc<AudioCatalog> {
        std::fs::write(dir.join("nyan.mp3"), b"riff").unwrap();
        let descriptor = dir.join("catalog.json");
        std::fs::write(
            &descriptor,
            r#"{ "clips": [ { "id": "nyan", "display_name": "Nyan", "aliases": ["cat"], "file_name": "nyan.mp3" } ] }"#,
        )
        .unwrap();
        Arc::new(AudioCatalog::load(&descriptor, dir).unwrap())
    }

    fn test_templates() -> HashMap<String, String> {
        [
            ("play.requested", "Playing {{clip}}"),
            ("play.missing_arg", "Which clip?"),
            ("play_with.no_clip", "No designated clip set"),
            ("play_with.not_in_voice", "Join voice first, then I can pull you into {{channel}}"),
            ("play_with.done", "Enjoy"),
            ("stop.done", "Stopped"),
            ("pause.done", "Paused"),
            ("resume.done", "Resumed"),
            ("connect.initiated", "Connecting to {{channel}}"),
            ("connect.refused", "Already busy"),
            ("connect.no_channel", "No channel to join"),
            ("disconnect.done", "Disconnected"),
            ("reset.started", "Resetting"),
            ("reset.no_channel", "No channel to reset into"),
            ("set.channel", "Channel is now {{channel}}"),
            ("set.clip", "Clip is now {{clip}}"),
            ("set.usage", "Usage: set channel|clip <value>"),
            ("set.failed", "Could not save"),
            ("sounds.list", "Clips:\n{{clips}}"),
            ("sounds.empty", "No clips"),
            ("help", "Commands: {{commands}}"),
            ("unknown_command", "No such command: {{command}}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[tokio::test]
    async fn test_non_prefixed_message_is_not_a_command() {
        let harness = Harness::new();
        assert_eq!(harness.dispatch("hello there").await, None);
        assert_eq!(harness.dispatch("!").await, None);
    }

    #[tokio::test]
    async fn test_unknown_command_still_replies() {
        let harness = Harness::new();
        let reply = harness.dispatch("!frobnicate").await.unwrap();
        assert!(reply.contains("frobnicate"));
    }

    #[tokio::test]
    async fn test_play_without_argument() {
        let harness = Harness::new();
        assert_eq!(harness.dispatch("!play").await.unwrap(), "Which clip?");
    }

    #[tokio::test]
    async fn test_play_connects_to_users_channel() {
        let harness = Harness::new();
        let reply = harness.dispatch("!play nyan").await.unwrap();
        assert_eq!(reply, "Playing nyan");

        let session = harness.context.voice.get(GroupId(1)).await.unwrap();
        assert!(session.is_connected().await);
        assert_eq!(session.connected_channel().await, Some(ChannelRef(5)));
    }

    #[tokio::test]
    async fn test_stop_without_session_is_harmless() {
        let harness = Harness::new();
        assert_eq!(harness.dispatch("!stop").await.unwrap(), "Stopped");
        assert!(harness.context.voice.get(GroupId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_set_channel_persists() {
        let harness = Harness::new();
        let reply = harness.dispatch("!set channel 42").await.unwrap();
        assert_eq!(reply, "Channel is now 42");
        assert_eq!(
            harness.context.settings.get(GroupId(1)).designated_channel,
            Some(ChannelRef(42))
        );
    }

    #[tokio::test]
    async fn test_set_rejects_bad_input() {
        let harness = Harness::new();
        assert_eq!(
            harness.dispatch("!set channel notanumber").await.unwrap(),
            "Usage: set channel|clip <value>"
        );
        assert_eq!(
            harness.dispatch("!set volume 3").await.unwrap(),
            "Usage: set channel|clip <value>"
        );
        assert_eq!(
            harness.dispatch("!set").await.unwrap(),
            "Usage: set channel|clip <value>"
        );
    }

    #[tokio::test]
    async fn test_reset_prefers_designated_channel() {
        let harness = Harness::new();
        harness.dispatch("!set channel 99").await.unwrap();
        assert_eq!(harness.dispatch("!reset").await.unwrap(), "Resetting");
    }

    #[tokio::test]
    async fn test_sounds_lists_catalog() {
        let harness = Harness::new();
        let reply = harness.dispatch("!sounds").await.unwrap();
        assert!(reply.contains("nyan (cat)"));
    }

    #[tokio::test]
    async fn test_help_lists_commands() {
        let harness = Harness::new();
        let reply = harness.dispatch("!help").await.unwrap();
        assert!(reply.contains("!play"));
        assert!(reply.contains("!help"));
    }

    #[tokio::test]
    async fn test_play_with_moves_user_and_plays_designated_clip() {
        let harness = Harness::new();
        harness.dispatch("!set channel 42").await.unwrap();
        harness.dispatch("!set clip nyan").await.unwrap();

        let reply = harness.dispatch("!play_with").await.unwrap();
        assert_eq!(reply, "Enjoy");
        assert_eq!(*harness.mover.moves.lock(), vec![(7, ChannelRef(42))]);

        let session = harness.context.voice.get(GroupId(1)).await.unwrap();
        assert_eq!(session.connected_channel().await, Some(ChannelRef(42)));
    }

    #[tokio::test]
    async fn test_play_with_needs_designated_clip() {
        let harness = Harness::new();
        harness.dispatch("!set channel 42").await.unwrap();

        let reply = harness.dispatch("!play_with").await.unwrap();
        assert_eq!(reply, "No designated clip set");
        assert!(harness.mover.moves.lock().is_empty());
    }

    #[tokio::test]
    async fn test_play_with_user_outside_voice() {
        let harness = Harness::new();
        harness.dispatch("!set channel 42").await.unwrap();
        harness.dispatch("!set clip nyan").await.unwrap();
        harness.mover.fail.store(true, Ordering::SeqCst);

        let reply = harness.dispatch("!play_with").await.unwrap();
        assert!(reply.contains("42"));
        // the move failed, no session should have been touched
        assert!(harness.context.voice.get(GroupId(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_connect_without_any_channel() {
        let harness = Harness::new();
        let reply = harness
            .registry
            .dispatch(
                "!connect",
                GroupId(2),
                None,
                7,
                Arc::clone(&harness.context),
                Arc::clone(&harness.state),
                harness.mover.clone() as Arc<dyn PlatformActions>,
            )
            .await
            .unwrap();
        assert_eq!(reply, "No channel to join");
    }
}
