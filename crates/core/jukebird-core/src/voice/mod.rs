//! Per-group voice playback subsystem
//!
//! One [`session::VoiceSession`] per call group, created lazily and exactly
//! once by the [`registry::VoiceRegistry`]. The session drives a
//! [`ports::TrackPlayer`] and a [`ports::VoiceTransport`] through the port
//! traits; the [`bridge::FrameBridge`] adapts the player's pull-based frame
//! production to the transport's fixed 20 ms cadence.

pub mod bridge;
pub mod ports;
pub mod registry;
pub mod session;
