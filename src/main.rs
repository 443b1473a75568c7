mod bot;
mod config;
mod llm;
mod memory;
mod platform;
mod server;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::Relay;
use crate::config::Config;
use crate::memory::InMemoryHistory;
use crate::platform::{TelegramApi, TelegramClient};
use crate::server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,telegram_ai_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Provider: {} ({})", config.llm.provider, config.llm.model);
    info!("  Bind address: {}", config.server.bind_address);
    info!("  Detached processing: {}", config.webhook.detach_processing);

    if !config.has_bot_token() {
        warn!("TELEGRAM_BOT_TOKEN is not set; Telegram API calls will fail");
    }

    let telegram: Arc<dyn TelegramApi> = Arc::new(TelegramClient::new(&config.telegram)?);

    let ai = match llm::provider_from_config(&config.llm) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!("AI provider unavailable: {:#}", e);
            None
        }
    };

    let relay = Relay::new(
        telegram.clone(),
        ai,
        Arc::new(InMemoryHistory::new()),
        config.llm.system_prompt.clone(),
    );

    // Create shared state
    let state = Arc::new(AppState {
        relay: Arc::new(relay),
        telegram,
        config,
    });

    info!("Relay is starting...");
    server::serve(state).await?;

    Ok(())
}
