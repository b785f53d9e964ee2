//! Bot serve command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{info, warn};

use paperstack::config::{self, Config, TelegramGatewayConfig};
use paperstack::fetch::HttpFetcher;
use paperstack::gateway::{
    ConversationHandler, GatewayManager, TelegramConfig, TelegramGateway, capabilities,
};
use paperstack::session::{InMemorySessionStore, SessionStore};
use paperstack::spool::Spool;

pub async fn run(config_path: &str) -> Result<()> {
    let config = Config::load(config_path).await?;

    // Resolve the spool root against the config file and make sure it exists
    let spool_dir = config::resolve_path(Path::new(config_path), &config.spool.dir);
    tokio::fs::create_dir_all(&spool_dir)
        .await
        .with_context(|| format!("failed to create spool directory {}", spool_dir.display()))?;
    info!(dir = %spool_dir.display(), "Spool directory ready");

    // Sessions are in-memory only; nothing survives a restart
    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    let gateways = GatewayManager::new(Duration::from_secs(config.handler_timeout_seconds));

    let handler = ConversationHandler::new(
        store,
        gateways.clone(),
        Spool::new(spool_dir),
        Arc::new(HttpFetcher::new()),
    );
    gateways.set_handler(Arc::new(handler)).await;

    // Start the Telegram gateway
    let telegram = config
        .gateways
        .telegram
        .filter(|t| t.enabled)
        .context("no gateway enabled; configure gateways.telegram in the config file")?;
    start_telegram_gateway(&gateways, telegram).await;

    info!("Paperstack running; press Ctrl+C to stop");
    shutdown_signal().await;

    // Shutdown gateways gracefully
    gateways.shutdown().await;

    info!("Paperstack stopped");
    Ok(())
}

async fn start_telegram_gateway(gateways: &GatewayManager, config: TelegramGatewayConfig) {
    let (cmd_rx, evt_tx) = gateways
        .register(
            "telegram",
            vec![
                capabilities::MEDIA.to_string(),
                capabilities::EDIT.to_string(),
                capabilities::TYPING.to_string(),
                capabilities::INLINE_KEYBOARD.to_string(),
            ],
        )
        .await;

    let gateway = TelegramGateway::new(TelegramConfig::new(&config.bot_token));

    tokio::spawn(async move {
        gateway.start(evt_tx, cmd_rx).await;
    });
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    {
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => warn!(error = %e, "Failed to install SIGTERM handler"),
            }
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
