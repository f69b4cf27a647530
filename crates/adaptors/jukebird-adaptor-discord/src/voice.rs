//! Discord voice backend
//!
//! Implements the core voice ports on top of songbird. The transport
//! initiates `songbird.join` on a background task and tracks the
//! acknowledgement itself, so `open_connection` never blocks on the
//! gateway handshake. The player drives songbird track handles; frame
//! pacing stays inside songbird's mixer, which is why `poll_frame` has
//! nothing to hand out here.
//!
//! The null backend at the bottom is the stand-in when the `voice`
//! feature is off, and the fixture the command tests run against.

use jukebird_core::{
    AudioFrame, ChannelRef, ClipResolver, ConnectionStatus, FrameSource, GroupId, Track,
    TrackEventListener, TrackPlayer, VoiceBackend, VoiceTransport,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "voice")]
use jukebird_core::Result;
#[cfg(feature = "voice")]
use tracing::{debug, error, info, warn};
#[cfg(feature = "voice")]
use serenity::model::id::{ChannelId, GuildId};
#[cfg(feature = "voice")]
use songbird::{
    input::File as SongbirdFile, tracks::PlayMode, tracks::TrackHandle, Event, EventContext,
    EventHandler as SongbirdEventHandler, Songbird, TrackEvent,
};

/// Backend wiring songbird players and transports into the core registry.
#[cfg(feature = "voice")]
pub struct SongbirdBackend {
    songbird: Arc<Songbird>,
    resolver: Arc<dyn ClipResolver>,
}

#[cfg(feature = "voice")]
impl SongbirdBackend {
    pub fn new(songbird: Arc<Songbird>, resolver: Arc<dyn ClipResolver>) -> Self {
        Self { songbird, resolver }
    }
}

#[cfg(feature = "voice")]
impl VoiceBackend for SongbirdBackend {
    fn create_player(&self, group: GroupId) -> Arc<dyn TrackPlayer> {
        Arc::new(SongbirdPlayer::new(
            Arc::clone(&self.songbird),
            GuildId::new(group.0),
        ))
    }

    fn create_transport(&self, group: GroupId) -> Arc<dyn VoiceTransport> {
        Arc::new(SongbirdTransport::new(
            Arc::clone(&self.songbird),
            GuildId::new(group.0),
        ))
    }

    fn resolver(&self) -> Arc<dyn ClipResolver> {
        Arc::clone(&self.resolver)
    }
}

#[cfg(feature = "voice")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransportState {
    Disconnected,
    Connecting(ChannelRef),
    Connected(ChannelRef),
}

/// Voice connection of one guild, backed by a songbird `Call`.
#[cfg(feature = "voice")]
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
    guild: GuildId,
    state: Arc<Mutex<TransportState>>,
    // retained so a future transport that pulls frames itself can drain it
    frame_source: Mutex<Option<Arc<dyn FrameSource>>>,
}

#[cfg(feature = "voice")]
impl SongbirdTransport {
    pub fn new(songbird: Arc<Songbird>, guild: GuildId) -> Self {
        Self {
            songbird,
            guild,
            state: Arc::new(Mutex::new(TransportState::Disconnected)),
            frame_source: Mutex::new(None),
        }
    }

    /// Records the gateway acknowledgement of a join attempt. Returns
    /// `false` when a close or a newer attempt superseded it while the
    /// join was in flight; the freshly joined call must then be torn down,
    /// otherwise the bot stays in the channel while `status` reports
    /// `Disconnected`.
    fn acknowledge_join(state: &Mutex<TransportState>, channel: ChannelRef) -> bool {
        let mut state = state.lock();
        if *state == TransportState::Connecting(channel) {
            *state = TransportState::Connected(channel);
            true
        } else {
            false
        }
    }
}

#[cfg(feature = "voice")]
#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn open_connection(&self, channel: ChannelRef) -> Result<()> {
        *self.state.lock() = TransportState::Connecting(channel);

        let songbird = Arc::clone(&self.songbird);
        let state = Arc::clone(&self.state);
        let guild = self.guild;
        tokio::spawn(async move {
            match songbird.join(guild, ChannelId::new(channel.0)).await {
                Ok(_call) => {
                    if Self::acknowledge_join(&state, channel) {
                        info!(guild_id = %guild, channel = %channel, "voice connection established");
                    } else {
                        // a close raced the join, drop the stale call
                        debug!(guild_id = %guild, channel = %channel, "join attempt superseded, leaving channel");
                        if let Err(e) = songbird.remove(guild).await {
                            debug!(guild_id = %guild, error = %e, "leaving superseded voice channel");
                        }
                    }
                }
                Err(e) => {
                    error!(guild_id = %guild, channel = %channel, error = %e, "voice join failed");
                    let mut state = state.lock();
                    if *state == TransportState::Connecting(channel) {
                        *state = TransportState::Disconnected;
                    }
                }
            }
        });
        Ok(())
    }

    async fn close_connection(&self) {
        *self.state.lock() = TransportState::Disconnected;
        if let Err(e) = self.songbird.remove(self.guild).await {
            // not being in a call is fine, close is idempotent
            debug!(guild_id = %self.guild, error = %e, "leaving voice channel");
        }
    }

    async fn status(&self) -> ConnectionStatus {
        match *self.state.lock() {
            TransportState::Disconnected => ConnectionStatus::Disconnected,
            TransportState::Connecting(_) => ConnectionStatus::Connecting,
            TransportState::Connected(_) => ConnectionStatus::Connected,
        }
    }

    async fn connected_channel(&self) -> Option<ChannelRef> {
        match *self.state.lock() {
            TransportState::Disconnected => None,
            TransportState::Connecting(channel) | TransportState::Connected(channel) => {
                Some(channel)
            }
        }
    }

    fn register_frame_source(&self, source: Arc<dyn FrameSource>) {
        *self.frame_source.lock() = Some(source);
    }
}

#[cfg(feature = "voice")]
type CurrentTrack = Arc<Mutex<Option<(Track, TrackHandle)>>>;
#[cfg(feature = "voice")]
type Listeners = Arc<Mutex<Vec<Arc<dyn TrackEventListener>>>>;

/// Track player of one guild, backed by songbird's mixer.
#[cfg(feature = "voice")]
pub struct SongbirdPlayer {
    songbird: Arc<Songbird>,
    guild: GuildId,
    current: CurrentTrack,
    listeners: Listeners,
    paused: Arc<AtomicBool>,
}

#[cfg(feature = "voice")]
impl SongbirdPlayer {
    pub fn new(songbird: Arc<Songbird>, guild: GuildId) -> Self {
        Self {
            songbird,
            guild,
            current: Arc::new(Mutex::new(None)),
            listeners: Arc::new(Mutex::new(Vec::new())),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[cfg(feature = "voice")]
impl TrackPlayer for SongbirdPlayer {
    fn play(&self, track: Track) {
        let songbird = Arc::clone(&self.songbird);
        let current = Arc::clone(&self.current);
        let listeners = Arc::clone(&self.listeners);
        let paused = Arc::clone(&self.paused);
        let guild = self.guild;
        tokio::spawn(async move {
            let Some(call_lock) = songbird.get(guild) else {
                warn!(guild_id = %guild, track = %track.locator, "no call for guild, dropping track");
                return;
            };
            let mut call = call_lock.lock().await;
            let handle = call.play_only_input(SongbirdFile::new(track.path.clone()).into());
            let notifier = TrackEndNotifier {
                track: track.clone(),
                listeners: Arc::clone(&listeners),
                current: Arc::clone(&current),
            };
            if let Err(e) = handle.add_event(Event::Track(TrackEvent::End), notifier) {
                warn!(guild_id = %guild, error = %e, "cannot register track end event");
            }
            paused.store(false, Ordering::SeqCst);
            *current.lock() = Some((track, handle));
        });
    }

    fn stop(&self) {
        if let Some((track, handle)) = self.current.lock().take() {
            debug!(track = %track.locator, "stopping songbird track");
            let _ = handle.stop();
        }
        self.paused.store(false, Ordering::SeqCst);
    }

    fn set_paused(&self, paused: bool) {
        let current = self.current.lock();
        if let Some((_, handle)) = current.as_ref() {
            let result = if paused { handle.pause() } else { handle.play() };
            match result {
                Ok(()) => self.paused.store(paused, Ordering::SeqCst),
                Err(e) => warn!(error = %e, "cannot change pause state"),
            }
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn playing_track(&self) -> Option<Track> {
        self.current.lock().as_ref().map(|(track, _)| track.clone())
    }

    fn poll_frame(&self) -> Option<AudioFrame> {
        // songbird's mixer paces and delivers frames itself
        None
    }

    fn add_listener(&self, listener: Arc<dyn TrackEventListener>) {
        self.listeners.lock().push(listener);
    }
}

/// Fires the core track-end listeners when songbird reports a track done.
/// A track that reached `PlayMode::End` finished naturally; anything else
/// was halted deliberately.
#[cfg(feature = "voice")]
struct TrackEndNotifier {
    track: Track,
    listeners: Listeners,
    current: CurrentTrack,
}

#[cfg(feature = "voice")]
#[async_trait]
impl SongbirdEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(ended) = ctx {
            for (state, _handle) in *ended {
                let natural_end = state.playing == PlayMode::End;
                {
                    let mut current = self.current.lock();
                    if current.as_ref().map(|(t, _)| t == &self.track).unwrap_or(false) {
                        *current = None;
                    }
                }
                let listeners = self.listeners.lock().clone();
                for listener in &listeners {
                    listener.on_track_end(&self.track, natural_end);
                }
            }
        }
        None
    }
}

/// Backend with no real audio path. Tracks state so the session logic can
/// run end to end; connections succeed instantly and playback is a no-op.
pub struct NullBackend {
    resolver: Arc<dyn ClipResolver>,
}

impl NullBackend {
    pub fn new(resolver: Arc<dyn ClipResolver>) -> Self {
        Self { resolver }
    }
}

impl VoiceBackend for NullBackend {
    fn create_player(&self, _group: GroupId) -> Arc<dyn TrackPlayer> {
        Arc::new(NullPlayer::default())
    }

    fn create_transport(&self, _group: GroupId) -> Arc<dyn VoiceTransport> {
        Arc::new(NullTransport::default())
    }

    fn resolver(&self) -> Arc<dyn ClipResolver> {
        Arc::clone(&self.resolver)
    }
}

#[derive(Default)]
pub struct NullTransport {
    channel: Mutex<Option<ChannelRef>>,
}

#[async_trait]
impl VoiceTransport for NullTransport {
    async fn open_connection(&self, channel: ChannelRef) -> jukebird_core::Result<()> {
        *self.channel.lock() = Some(channel);
        Ok(())
    }

    async fn close_connection(&self) {
        *self.channel.lock() = None;
    }

    async fn status(&self) -> ConnectionStatus {
        if self.channel.lock().is_some() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        }
    }

    async fn connected_channel(&self) -> Option<ChannelRef> {
        *self.channel.lock()
    }

    fn register_frame_source(&self, _source: Arc<dyn FrameSource>) {}
}

#[derive(Default)]
pub struct NullPlayer {
    current: Mutex<Option<Track>>,
    paused: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn TrackEventListener>>>,
}

impl NullPlayer {
    /// Simulates the current track running to its natural end.
    pub fn finish_current(&self) {
        if let Some(track) = self.current.lock().take() {
            let listeners = self.listeners.lock().clone();
            for listener in &listeners {
                listener.on_track_end(&track, true);
            }
        }
    }
}

impl TrackPlayer for NullPlayer {
    fn play(&self, track: Track) {
        *self.current.lock() = Some(track);
        self.paused.store(false, Ordering::SeqCst);
    }

    fn stop(&self) {
        if let Some(track) = self.current.lock().take() {
            let listeners = self.listeners.lock().clone();
            for listener in &listeners {
                listener.on_track_end(&track, false);
            }
        }
        self.paused.store(false, Ordering::SeqCst);
    }

    fn set_paused(&self, paused: bool) {
        if self.current.lock().is_some() {
            self.paused.store(paused, Ordering::SeqCst);
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    fn playing_track(&self) -> Option<Track> {
        self.current.lock().clone()
    }

    fn poll_frame(&self) -> Option<AudioFrame> {
        None
    }

    fn add_listener(&self, listener: Arc<dyn TrackEventListener>) {
        self.listeners.lock().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    fn track(locator: &str) -> Track {
        Track {
            locator: locator.to_string(),
            path: PathBuf::from(format!("/clips/{locator}.mp3")),
        }
    }

    struct RecordingListener {
        natural_ends: AtomicUsize,
        halts: AtomicUsize,
    }

    impl TrackEventListener for RecordingListener {
        fn on_track_end(&self, _track: &Track, may_start_next: bool) {
            if may_start_next {
                self.natural_ends.fetch_add(1, Ordering::SeqCst);
            } else {
                self.halts.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[tokio::test]
    async fn test_null_transport_connects_instantly() {
        let transport = NullTransport::default();
        assert_eq!(transport.status().await, ConnectionStatus::Disconnected);

        transport.open_connection(ChannelRef(5)).await.unwrap();
        assert_eq!(transport.status().await, ConnectionStatus::Connected);
        assert_eq!(transport.connected_channel().await, Some(ChannelRef(5)));

        transport.close_connection().await;
        assert_eq!(transport.status().await, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_null_player_distinguishes_halt_from_natural_end() {
        let player = NullPlayer::default();
        let listener = Arc::new(RecordingListener {
            natural_ends: AtomicUsize::new(0),
            halts: AtomicUsize::new(0),
        });
        player.add_listener(listener.clone());

        player.play(track("one"));
        player.stop();
        assert_eq!(listener.halts.load(Ordering::SeqCst), 1);

        player.play(track("two"));
        player.finish_current();
        assert_eq!(listener.natural_ends.load(Ordering::SeqCst), 1);
        assert!(player.playing_track().is_none());
    }

    #[cfg(feature = "voice")]
    #[test]
    fn test_join_acknowledged_while_attempt_pending() {
        let state = Mutex::new(TransportState::Connecting(ChannelRef(5)));
        assert!(SongbirdTransport::acknowledge_join(&state, ChannelRef(5)));
        assert_eq!(*state.lock(), TransportState::Connected(ChannelRef(5)));
    }

    #[cfg(feature = "voice")]
    #[test]
    fn test_join_after_close_demands_teardown() {
        // close_connection flipped the state before the gateway answered;
        // the late join must not be recorded and its call gets removed
        let state = Mutex::new(TransportState::Disconnected);
        assert!(!SongbirdTransport::acknowledge_join(&state, ChannelRef(5)));
        assert_eq!(*state.lock(), TransportState::Disconnected);
    }

    #[cfg(feature = "voice")]
    #[test]
    fn test_join_superseded_by_newer_attempt() {
        let state = Mutex::new(TransportState::Connecting(ChannelRef(9)));
        assert!(!SongbirdTransport::acknowledge_join(&state, ChannelRef(5)));
        assert_eq!(*state.lock(), TransportState::Connecting(ChannelRef(9)));
    }

    #[test]
    fn test_null_player_pause_needs_a_track() {
        let player = NullPlayer::default();
        player.set_paused(true);
        assert!(!player.is_paused());

        player.play(track("one"));
        player.set_paused(true);
        assert!(player.is_paused());
        player.stop();
        assert!(!player.is_paused());
    }
}
