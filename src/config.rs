//! Configuration for the relay service.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Default server port.
pub const DEFAULT_PORT: u16 = 5137;

/// Environment variable prefix shared by every setting.
const ENV_PREFIX: &str = "GIFTGPT_";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A value is out of range or empty.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// The provider base URL does not parse.
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),
}

/// Top-level configuration for the relay service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Upstream LLM provider settings.
    pub provider: ProviderConfig,
    /// Session storage settings.
    pub storage: StorageConfig,
    /// Header carrying the owner id resolved by the auth layer in front of us.
    pub identity_header: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            provider: ProviderConfig::default(),
            storage: StorageConfig::default(),
            identity_header: "x-owner-id".to_string(),
        }
    }
}

impl RelayConfig {
    /// Create a new config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `GIFTGPT_*` environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_var("PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(url) = env_var("PROVIDER_URL") {
            config.provider.base_url = url;
        }
        if let Some(model) = env_var("TEXT_MODEL") {
            config.provider.text_model = model;
        }
        if let Some(model) = env_var("AUDIO_MODEL") {
            config.provider.audio_model = model;
        }
        if let Some(version) = env_var("API_VERSION") {
            config.provider.api_version = version;
        }
        if let Some(path) = env_var("SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(header) = env_var("IDENTITY_HEADER") {
            config.identity_header = header;
        }

        config
    }

    /// Point the provider at another base URL.
    #[must_use]
    pub fn with_provider_url(mut self, url: impl Into<String>) -> Self {
        self.provider.base_url = url.into();
        self
    }

    /// Set the idle timeout applied between upstream stream chunks.
    #[must_use]
    pub const fn with_stream_idle_timeout(mut self, timeout: Duration) -> Self {
        self.provider.stream_idle_timeout = timeout;
        self
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any value is out of range or invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.provider.base_url)?;

        if self.provider.text_model.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.text_model must not be empty".to_string()));
        }
        if self.provider.audio_model.trim().is_empty() {
            return Err(ConfigError::Invalid("provider.audio_model must not be empty".to_string()));
        }
        if self.provider.connect_timeout.is_zero()
            || self.provider.request_timeout.is_zero()
            || self.provider.stream_idle_timeout.is_zero()
        {
            return Err(ConfigError::Invalid("provider timeouts must be > 0".to_string()));
        }
        if self.provider.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("provider.max_frame_bytes must be > 0".to_string()));
        }
        if self.identity_header.trim().is_empty() {
            return Err(ConfigError::Invalid("identity_header must not be empty".to_string()));
        }

        Ok(())
    }
}

/// Upstream provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider API (no trailing path).
    pub base_url: String,
    /// Model used for text completions.
    pub text_model: String,
    /// Fixed model marker sent with audio completions.
    pub audio_model: String,
    /// Value of the `OpenAI-Version` header.
    pub api_version: String,
    /// Connection timeout.
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
    /// Whole-request timeout for synchronous completions.
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
    /// Maximum silence between two upstream chunks on a streaming call.
    #[serde(with = "duration_serde")]
    pub stream_idle_timeout: Duration,
    /// Longest SSE line accepted before the decoder gives up.
    pub max_frame_bytes: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            text_model: "gpt-4o".to_string(),
            audio_model: "gpt-4o".to_string(),
            api_version: "2024-12-17".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(120),
            stream_idle_timeout: Duration::from_secs(60),
            max_frame_bytes: 1024 * 1024, // 1 MiB
        }
    }
}

/// Session storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database file.
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("giftgpt.sqlite3"),
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{name}"))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Serde module for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
