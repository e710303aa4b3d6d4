//! Startup helpers for the relay server.

use std::process::ExitCode;
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::server::{self, AppState};

/// Run the server until Ctrl-C.
///
/// # Returns
/// `ExitCode::SUCCESS` on graceful shutdown, `1` on failure.
#[must_use]
pub fn run() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting giftgpt relay v{}", env!("CARGO_PKG_VERSION"));

    let config = RelayConfig::from_env();
    if let Err(e) = config.validate() {
        tracing::error!("{e}");
        return ExitCode::from(1);
    }

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    let result = rt.block_on(async {
        let state = initialize(&config).await?;
        server::run_server_with_shutdown(state, config.port, shutdown_signal()).await
    });

    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        return ExitCode::from(1);
    }

    tracing::info!("relay stopped");
    ExitCode::SUCCESS
}

/// Initialize application state without starting the server.
///
/// # Errors
/// Returns an error if state creation fails.
pub async fn initialize(config: &RelayConfig) -> Result<Arc<AppState>, Box<dyn std::error::Error + Send + Sync>> {
    AppState::new(config)
        .await
        .map_err(|e| format!("Failed to create state: {e}").into())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
