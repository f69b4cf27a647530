//! Port traits for the external voice collaborators
//!
//! The voice subsystem owns sessions and their lifecycle, not the platform
//! plumbing. Three collaborators are consumed through traits so that the
//! Discord adaptor (or a test double) can supply them:
//!
//! - [`VoiceTransport`] — the real-time connection delivering frames to a
//!   voice channel
//! - [`TrackPlayer`] — the decoder/player producing frames on demand
//! - [`ClipResolver`] — the async resolver turning a locator into one of
//!   four load outcomes
//!
//! [`VoiceBackend`] bundles per-group construction of the first two plus a
//! shared resolver.

use crate::error::Result;
use crate::types::{ChannelRef, GroupId};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;

/// Connection state to the remote voice transport.
///
/// Derived by querying the transport; sessions never cache it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection and none in flight
    Disconnected,
    /// A connection attempt was initiated and has not been acknowledged yet
    Connecting,
    /// The transport acknowledged the connection
    Connected,
}

/// A resolved, playable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// The locator the caller asked for (clip name, id or path)
    pub locator: String,
    /// Resolved location of the audio source
    pub path: PathBuf,
}

/// One ~20 ms unit of encoded audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Encoded frame payload
    pub data: Bytes,
}

/// Outcome of an asynchronous clip resolution. Exactly one is delivered
/// per request, at an indeterminate later time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A single track resolved
    TrackLoaded(Track),
    /// A collection resolved; `selected` points at its designated entry
    PlaylistLoaded {
        /// Tracks of the collection, in order
        tracks: Vec<Track>,
        /// Index of the designated entry, if the collection has one
        selected: Option<usize>,
    },
    /// The locator matched nothing
    NoMatches,
    /// Resolution itself failed
    LoadFailed(String),
}

/// Pull contract the transport expects from a frame provider.
///
/// Implementations must never block the caller, never deliver the same
/// frame twice and never synthesize frames.
pub trait FrameSource: Send + Sync {
    /// Whether a frame is available right now. May pull one from the
    /// underlying player, but returns immediately either way.
    fn can_provide(&self) -> bool;
    /// Takes the next frame payload, or `None` if the player produced
    /// nothing. Each frame is delivered at most once.
    fn provide_frame(&self) -> Option<Bytes>;
    /// Whether frames are Opus-encoded.
    fn is_opus(&self) -> bool;
}

/// Listener for track lifecycle events. Registration is not deduplicated;
/// avoiding duplicates is the caller's responsibility.
pub trait TrackEventListener: Send + Sync {
    /// Called when a track stops playing. `may_start_next` is `false` when
    /// the track was halted deliberately (stop/replace), `true` when it
    /// ran to its natural end.
    fn on_track_end(&self, track: &Track, may_start_next: bool);
}

/// The decoder/player owned by one voice session.
///
/// All operations are non-blocking; `play` replaces whatever was playing.
#[cfg_attr(test, mockall::automock)]
pub trait TrackPlayer: Send + Sync {
    /// Starts the given track, replacing any current one.
    fn play(&self, track: Track);
    /// Halts the current track. Idempotent.
    fn stop(&self);
    /// Pauses or resumes the current track.
    fn set_paused(&self, paused: bool);
    /// Whether playback is currently paused.
    fn is_paused(&self) -> bool;
    /// The currently playing track, if any.
    fn playing_track(&self) -> Option<Track>;
    /// Non-blocking poll for the next encoded frame.
    fn poll_frame(&self) -> Option<AudioFrame>;
    /// Registers a lifecycle listener (no dedup).
    fn add_listener(&self, listener: Arc<dyn TrackEventListener>);
}

/// The remote voice transport for one call group.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Initiates a connection to the given channel. Does not wait for the
    /// transport's acknowledgement; completion is observed via [`Self::status`].
    async fn open_connection(&self, channel: ChannelRef) -> Result<()>;
    /// Closes the connection. Idempotent, safe in any state.
    async fn close_connection(&self);
    /// Current connection state.
    async fn status(&self) -> ConnectionStatus;
    /// Channel the transport is connected (or connecting) to.
    async fn connected_channel(&self) -> Option<ChannelRef>;
    /// Registers the pull-based frame provider the transport should drain.
    fn register_frame_source(&self, source: Arc<dyn FrameSource>);
}

/// Asynchronous resolver turning a locator into a [`LoadOutcome`].
///
/// Never returns an error; failures are an outcome of their own.
#[async_trait]
pub trait ClipResolver: Send + Sync {
    /// Resolves the locator. Completes at an indeterminate later time.
    async fn resolve(&self, locator: &str) -> LoadOutcome;
}

/// Factory for the per-group collaborators of a voice session.
pub trait VoiceBackend: Send + Sync {
    /// Allocates a fresh player for the group.
    fn create_player(&self, group: GroupId) -> Arc<dyn TrackPlayer>;
    /// Allocates the transport handle for the group.
    fn create_transport(&self, group: GroupId) -> Arc<dyn VoiceTransport>;
    /// The shared resolver.
    fn resolver(&self) -> Arc<dyn ClipResolver>;
}
