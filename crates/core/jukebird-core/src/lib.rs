//! Jukebird Core
//!
//! Platform-agnostic heart of the Jukebird soundboard bot:
//!
//! - Audio catalog loaded once at startup from a JSON descriptor
//! - One lazily-created voice session per call group (guild)
//! - Pull-based frame bridge between the track player and the voice transport
//! - Async clip resolution with a stale-outcome sequence guard
//!
//! The chat platform itself (gateway, commands, the concrete voice transport
//! and player) lives behind the port traits in [`voice::ports`] and is
//! provided by an adaptor crate.

#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod resolver;
pub mod responses;
pub mod settings;
pub mod types;
pub mod voice;

pub use catalog::{AudioCatalog, AudioClip};
pub use config::BotConfig;
pub use context::BotContext;
pub use error::{JukebirdError, Result};
pub use resolver::CatalogResolver;
pub use responses::Responses;
pub use settings::{GroupSettings, SettingsStore};
pub use types::{ChannelRef, GroupId};
pub use voice::bridge::FrameBridge;
pub use voice::ports::{
    AudioFrame, ClipResolver, ConnectionStatus, FrameSource, LoadOutcome, Track,
    TrackEventListener, TrackPlayer, VoiceBackend, VoiceTransport,
};
pub use voice::registry::VoiceRegistry;
pub use voice::session::VoiceSession;
