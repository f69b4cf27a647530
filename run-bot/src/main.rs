//! Jukebird launcher
//!
//! Loads configuration, builds the catalog and responses, then hands
//! control to the Discord adapter until the gateway connection ends.

use anyhow::Context as _;
use clap::Parser;
use jukebird_adaptor_discord::{start_discord, DiscordConfig};
use jukebird_core::{AudioCatalog, BotConfig, Responses, SettingsStore};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "jukebird", about = "Self-hosted Discord soundboard bot")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "jukebird.json")]
    config: PathBuf,

    /// Log filter, e.g. "info" or "jukebird_core=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone())),
        )
        .init();

    let config = BotConfig::load(&cli.config)
        .context("loading configuration")?
        .apply_env();
    config.validate().context("validating configuration")?;

    // a missing catalog or clip folder is fatal at startup
    let catalog = match AudioCatalog::load(&config.catalog_file, &config.clip_folder) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!(error = %e, "cannot load audio catalog");
            std::process::exit(1);
        }
    };
    info!(clips = catalog.len(), "audio catalog ready");

    let responses = Arc::new(Responses::load(&config.responses_file).context("loading responses")?);
    let settings = Arc::new(SettingsStore::open(&config.settings_dir).context("opening settings store")?);

    let discord = DiscordConfig::new(config.token.clone());
    start_discord(discord, config, catalog, responses, settings)
        .await
        .context("running discord adapter")?;
    Ok(())
}
