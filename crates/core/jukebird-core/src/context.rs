//! Bot context
//!
//! One `BotContext` bundles the long-lived services every command handler
//! needs: configuration, catalog, responses, settings and the voice
//! registry. The process builds it exactly once through
//! [`BotContext::initialize`]; a second initialization is a programming
//! error and is rejected.

use crate::catalog::AudioCatalog;
use crate::config::BotConfig;
use crate::error::{JukebirdError, Result};
use crate::responses::Responses;
use crate::settings::SettingsStore;
use crate::voice::ports::VoiceBackend;
use crate::voice::registry::VoiceRegistry;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::info;

static INITIALIZED: OnceCell<()> = OnceCell::new();

/// Shared services of a running bot.
pub struct BotContext {
    pub config: BotConfig,
    pub catalog: Arc<AudioCatalog>,
    pub responses: Arc<Responses>,
    pub settings: Arc<SettingsStore>,
    pub voice: Arc<VoiceRegistry>,
}

impl BotContext {
    /// Assembles a context from already-constructed services. Carries no
    /// process-wide guard; `initialize` is the entry point for the binary.
    pub fn new(
        config: BotConfig,
        catalog: Arc<AudioCatalog>,
        responses: Arc<Responses>,
        settings: Arc<SettingsStore>,
        backend: Arc<dyn VoiceBackend>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            catalog,
            responses,
            settings,
            voice: Arc::new(VoiceRegistry::new(backend)),
        })
    }

    /// Builds the process-wide context. Fails with `AlreadyInitialized` if
    /// called twice in one process.
    pub fn initialize(
        config: BotConfig,
        catalog: Arc<AudioCatalog>,
        responses: Arc<Responses>,
        settings: Arc<SettingsStore>,
        backend: Arc<dyn VoiceBackend>,
    ) -> Result<Arc<Self>> {
        INITIALIZED.set(()).map_err(|_| {
            JukebirdError::AlreadyInitialized("bot context already initialized".to_string())
        })?;
        info!(clips = catalog.len(), "bot context initialized");
        Ok(Self::new(config, catalog, responses, settings, backend))
    }
}
