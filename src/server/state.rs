//! Application state shared across all request handlers.

use std::sync::Arc;

use axum::http::HeaderName;

use crate::config::RelayConfig;
use crate::llm::OpenAiClient;
use crate::relay::RelayController;
use crate::sessions::{SessionStore, SqliteSessionStore};

/// Shared application state.
pub struct AppState {
    /// Relay controller over the configured provider.
    pub relay: RelayController,
    /// Session persistence.
    pub sessions: Arc<dyn SessionStore>,
    /// Header carrying the caller's owner id.
    pub identity_header: HeaderName,
}

impl AppState {
    /// Create a new application state from configuration.
    ///
    /// # Errors
    /// Returns an error if the identity header name is invalid, the HTTP client
    /// cannot be built, or the session database cannot be opened.
    pub async fn new(config: &RelayConfig) -> Result<Arc<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let upstream = OpenAiClient::new(&config.provider)
            .map_err(|e| format!("Failed to create provider client: {e}"))?;
        let sessions = SqliteSessionStore::open(&config.storage)
            .await
            .map_err(|e| format!("Failed to open session store: {e}"))?;
        let identity_header = HeaderName::try_from(config.identity_header.as_str())?;

        tracing::info!(
            provider = %config.provider.base_url,
            text_model = %config.provider.text_model,
            audio_model = %config.provider.audio_model,
            sqlite = %config.storage.sqlite_path.display(),
            "application state ready"
        );

        Ok(Self::from_parts(
            RelayController::new(Arc::new(upstream), &config.provider),
            Arc::new(sessions),
            identity_header,
        ))
    }

    /// Assemble state from already-built parts.
    #[must_use]
    pub fn from_parts(
        relay: RelayController,
        sessions: Arc<dyn SessionStore>,
        identity_header: HeaderName,
    ) -> Arc<Self> {
        Arc::new(Self {
            relay,
            sessions,
            identity_header,
        })
    }
}
