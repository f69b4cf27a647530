//! Voice session
//!
//! One `VoiceSession` per call group, owning that group's player, transport
//! handle and frame bridge. Connection state is derived from the transport
//! on every query, never cached here.
//!
//! ## Load sequence guard
//!
//! Clip resolution completes on its own task, so an outcome can arrive
//! after the caller has already issued a newer `play`, a `stop` or a
//! `disconnect`. Every request that affects playback bumps a monotonic
//! sequence number; an outcome is applied only while its number is still
//! the latest issued. The last command wins, and a stale callback can never
//! restart playback after an explicit stop.

use crate::types::{ChannelRef, GroupId};
use crate::voice::bridge::FrameBridge;
use crate::voice::ports::{
    ClipResolver, ConnectionStatus, FrameSource, LoadOutcome, Track, TrackEventListener,
    TrackPlayer, VoiceTransport,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause between the disconnect and reconnect steps of [`VoiceSession::reset`].
const RESET_SETTLE: Duration = Duration::from_millis(500);
/// Hold time on the re-opened connection before tearing it down again.
const RESET_HOLD: Duration = Duration::from_secs(1);

/// Playback lifecycle for one call group.
pub struct VoiceSession {
    group: GroupId,
    player: Arc<dyn TrackPlayer>,
    transport: Arc<dyn VoiceTransport>,
    resolver: Arc<dyn ClipResolver>,
    bridge: Arc<FrameBridge>,
    /// Monotonic sequence of playback-affecting requests; outcomes tagged
    /// with an older value are discarded.
    load_seq: AtomicU64,
    /// Serializes mutating operations on this session's player/transport.
    ops: tokio::sync::Mutex<()>,
    /// Pending recovery sequence, if any.
    reset_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSession {
    /// Creates the session for a group. Called by the registry exactly once
    /// per group.
    pub(crate) fn new(
        group: GroupId,
        player: Arc<dyn TrackPlayer>,
        transport: Arc<dyn VoiceTransport>,
        resolver: Arc<dyn ClipResolver>,
    ) -> Arc<Self> {
        info!(group = %group, "creating voice session");
        let bridge = FrameBridge::new(Arc::clone(&player));
        Arc::new(Self {
            group,
            player,
            transport,
            resolver,
            bridge,
            load_seq: AtomicU64::new(0),
            ops: tokio::sync::Mutex::new(()),
            reset_task: parking_lot::Mutex::new(None),
        })
    }

    /// The group this session belongs to.
    pub fn group(&self) -> GroupId {
        self.group
    }

    /// Hands the session's frame bridge to its transport.
    pub fn register_frame_source(&self) {
        let source: Arc<dyn FrameSource> = Arc::clone(&self.bridge) as Arc<dyn FrameSource>;
        self.transport.register_frame_source(source);
    }

    /// Connects the session to the given voice channel.
    ///
    /// Refuses while a connection attempt is already in flight, and while
    /// connected unless `force` is set, in which case the existing
    /// connection is closed first. Only initiates the connection; the
    /// transport acknowledges asynchronously. Returns whether the state is
    /// `Connecting` or `Connected` after the attempt.
    pub async fn connect(&self, channel: ChannelRef, force: bool) -> bool {
        let _ops = self.ops.lock().await;
        match self.transport.status().await {
            ConnectionStatus::Connecting => {
                warn!(
                    group = %self.group,
                    "connect requested while a connection attempt is in flight, ignoring"
                );
                false
            }
            ConnectionStatus::Connected if !force => {
                warn!(group = %self.group, "connect requested while already connected, skipping");
                false
            }
            ConnectionStatus::Connected => {
                info!(group = %self.group, "force enabled, closing current connection first");
                self.invalidate_pending_loads();
                self.open(channel).await
            }
            ConnectionStatus::Disconnected => self.open(channel).await,
        }
    }

    /// Stops playback and closes the voice connection. Idempotent and safe
    /// in any state; also invalidates any in-flight load outcome.
    pub async fn disconnect(&self) {
        self.cancel_reset();
        self.disconnect_inner().await;
    }

    /// Requests playback of the given locator.
    ///
    /// Resolution happens asynchronously; this only submits the request.
    /// Playing while not connected is a warning, not an error — the
    /// transport simply drops the frames.
    pub async fn play(self: &Arc<Self>, locator: &str) {
        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        if self.transport.status().await != ConnectionStatus::Connected {
            warn!(
                group = %self.group,
                locator = %locator,
                "play requested while not connected to voice, going ahead anyway"
            );
        }
        let session = Arc::clone(self);
        let locator = locator.to_string();
        tokio::spawn(async move {
            let outcome = session.resolver.resolve(&locator).await;
            session.apply_outcome(seq, &locator, outcome).await;
        });
    }

    /// Halts the current track. Idempotent; invalidates any in-flight load
    /// outcome.
    pub async fn stop(&self) {
        self.invalidate_pending_loads();
        let _ops = self.ops.lock().await;
        debug!(group = %self.group, "stopping track");
        self.player.stop();
    }

    /// Pauses or resumes the current track. Ignored with a warning while
    /// not connected.
    pub async fn set_paused(&self, paused: bool) {
        if self.transport.status().await != ConnectionStatus::Connected {
            warn!(
                group = %self.group,
                "pause requested while not connected to voice, ignoring"
            );
            return;
        }
        let _ops = self.ops.lock().await;
        self.player.set_paused(paused);
    }

    /// Whether a track is currently playing.
    pub fn is_playing(&self) -> bool {
        self.player.playing_track().is_some()
    }

    /// Whether playback is paused.
    pub fn is_paused(&self) -> bool {
        self.player.is_paused()
    }

    /// Whether the transport acknowledged a connection.
    pub async fn is_connected(&self) -> bool {
        self.transport.status().await == ConnectionStatus::Connected
    }

    /// The channel the session is connected (or connecting) to.
    pub async fn connected_channel(&self) -> Option<ChannelRef> {
        self.transport.connected_channel().await
    }

    /// Registers a track lifecycle listener. Registrations are not
    /// deduplicated.
    pub fn add_listener(&self, listener: Arc<dyn TrackEventListener>) {
        self.player.add_listener(listener);
    }

    /// Recovery routine: disconnect, wait, force-reconnect, wait, tear down
    /// again. Runs as a scheduled task so it never blocks the caller; a
    /// newer `reset` or a `disconnect` cancels a pending one.
    pub fn reset(self: &Arc<Self>, channel: ChannelRef) {
        let session = Arc::clone(self);
        let task = tokio::spawn(async move {
            info!(group = %session.group, "running voice recovery sequence");
            session.stop().await;
            session.disconnect_inner().await;
            tokio::time::sleep(RESET_SETTLE).await;
            session.connect(channel, true).await;
            tokio::time::sleep(RESET_HOLD).await;
            session.stop().await;
            session.disconnect_inner().await;
        });
        if let Some(previous) = self.reset_task.lock().replace(task) {
            previous.abort();
        }
    }

    fn cancel_reset(&self) {
        if let Some(task) = self.reset_task.lock().take() {
            task.abort();
        }
    }

    fn invalidate_pending_loads(&self) {
        self.load_seq.fetch_add(1, Ordering::SeqCst);
    }

    async fn disconnect_inner(&self) {
        self.invalidate_pending_loads();
        let _ops = self.ops.lock().await;
        info!(group = %self.group, "disconnecting from voice");
        self.player.stop();
        self.transport.close_connection().await;
    }

    /// Stops playback, closes any existing connection and initiates a new
    /// one. Holds no assumptions about the current state.
    async fn open(&self, channel: ChannelRef) -> bool {
        self.player.stop();
        self.transport.close_connection().await;
        if let Err(e) = self.transport.open_connection(channel).await {
            error!(
                group = %self.group,
                channel = %channel,
                error = %e,
                "failed to open voice connection"
            );
        }
        let status = self.transport.status().await;
        if status == ConnectionStatus::Connecting || status == ConnectionStatus::Connected {
            info!(group = %self.group, channel = %channel, "voice connection initiated");
            true
        } else {
            false
        }
    }

    async fn apply_outcome(&self, seq: u64, locator: &str, outcome: LoadOutcome) {
        let _ops = self.ops.lock().await;
        if self.load_seq.load(Ordering::SeqCst) != seq {
            debug!(
                group = %self.group,
                locator = %locator,
                "stale load outcome discarded"
            );
            return;
        }
        match outcome {
            LoadOutcome::TrackLoaded(track) => self.start_track(track),
            LoadOutcome::PlaylistLoaded { tracks, selected } => {
                let picked = selected
                    .and_then(|index| tracks.get(index).cloned())
                    .or_else(|| tracks.first().cloned());
                match picked {
                    Some(track) => {
                        debug!(
                            group = %self.group,
                            track = %track.locator,
                            "playing designated entry of resolved collection"
                        );
                        self.start_track(track);
                    }
                    None => warn!(group = %self.group, locator = %locator, "resolved collection is empty"),
                }
            }
            LoadOutcome::NoMatches => {
                warn!(group = %self.group, locator = %locator, "audio resource not found");
            }
            LoadOutcome::LoadFailed(reason) => {
                error!(
                    group = %self.group,
                    locator = %locator,
                    reason = %reason,
                    "failed to load audio resource"
                );
            }
        }
    }

    /// At most one track plays per session: starting is always a replace.
    fn start_track(&self, track: Track) {
        debug!(group = %self.group, track = %track.locator, "starting track");
        self.player.stop();
        self.player.play(track);
    }

    #[cfg(test)]
    fn begin_load(&self) -> u64 {
        self.load_seq.fetch_add(1, Ordering::SeqCst) + 1
    }
}
