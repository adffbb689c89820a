mod dispatch;
mod telegram;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use siphon_core::{
    load_config, validate_config, Courier, DownloadOrchestrator, FfmpegTool, MediaTool,
    MyJdAgent, PostProcessor, SessionDriver, SessionRegistry,
};

use dispatch::Dispatcher;
use telegram::TelegramClient;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pause before retrying a failed update poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting siphon v{}", VERSION);

    let config_path = std::env::var("SIPHON_CONFIG")
        .map(PathBuf::from)
        .or_else(|_| {
            std::env::args()
                .nth(1)
                .map(PathBuf::from)
                .ok_or(std::env::VarError::NotPresent)
        })
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;
    info!(
        authorized_users = config.telegram.authorized_users.len(),
        device = %config.agent.device_name,
        "Configuration loaded"
    );

    // Download agent
    let agent = Arc::new(
        MyJdAgent::new(config.agent.clone()).context("Failed to create download agent")?,
    );
    let orchestrator = Arc::new(DownloadOrchestrator::new(
        config.orchestrator.clone(),
        agent,
    ));
    orchestrator
        .connect()
        .await
        .context("Failed to connect to the download agent")?;
    info!("Download agent connected");

    // Media tooling
    let tool = Arc::new(FfmpegTool::new(config.media.clone()));
    tool.validate()
        .await
        .context("Media tooling is not usable")?;
    info!("Media tooling validated");

    let processor = Arc::new(PostProcessor::new(
        config.pipeline.clone(),
        config.delivery.max_payload_bytes,
        tool,
    ));

    // Telegram channel
    let client = Arc::new(
        TelegramClient::new(&config.telegram).context("Failed to create Telegram client")?,
    );
    let courier = Arc::new(Courier::new(config.delivery.clone(), client.clone()));

    // Sessions
    let registry = Arc::new(SessionRegistry::new(config.session.clone()));
    registry.start();

    let driver = SessionDriver::new(
        orchestrator,
        processor,
        courier,
        client.clone(),
        Arc::clone(&registry),
        Duration::from_millis(config.orchestrator.poll_interval_ms),
    );
    let dispatcher = Dispatcher::new(
        driver,
        client.clone(),
        config.telegram.authorized_users.clone(),
    );

    info!("Polling for updates");
    let mut offset = 0i64;
    loop {
        tokio::select! {
            _ = shutdown_signal() => break,
            batch = client.get_updates(offset) => match batch {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        dispatcher.handle_update(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Update poll failed");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            },
        }
    }

    info!("Shutting down");
    registry.stop();
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
