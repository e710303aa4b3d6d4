//! Error types for upstream provider calls and stream decoding.

use std::fmt;

use thiserror::Error;

/// Broad classification of an upstream failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// Connection, TLS, or read failure, including idle timeouts.
    Network,
    /// The provider rejected the credential (401/403).
    Auth,
    /// The provider throttled the request (429).
    RateLimit,
    /// Any other non-2xx status.
    ProviderError,
    /// A 2xx response whose body could not be understood.
    MalformedResponse,
}

impl UpstreamErrorKind {
    /// Classify a non-success HTTP status.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            _ => Self::ProviderError,
        }
    }

    /// Stable snake-case name, used in logs and error bodies.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Auth => "auth",
            Self::RateLimit => "rate_limit",
            Self::ProviderError => "provider_error",
            Self::MalformedResponse => "malformed_response",
        }
    }
}

impl fmt::Display for UpstreamErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure talking to the LLM provider.
#[derive(Debug, Clone, Error)]
#[error("upstream {kind} error{}: {detail}", status_suffix(.status))]
pub struct UpstreamError {
    /// Classification.
    pub kind: UpstreamErrorKind,
    /// Provider status code, when the failure came from a non-2xx response.
    pub status: Option<u16>,
    /// Provider body or transport message.
    pub detail: String,
    /// Set when the failure was our own idle timeout rather than a transport error.
    pub timed_out: bool,
}

impl UpstreamError {
    /// Transport-level failure.
    #[must_use]
    pub fn network(detail: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Network,
            status: None,
            detail: detail.into(),
            timed_out: false,
        }
    }

    /// The upstream went silent for longer than the idle timeout.
    #[must_use]
    pub fn idle_timeout(detail: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::network(detail)
        }
    }

    /// A non-2xx response, with the body read in full.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::from_status(status),
            status: Some(status),
            detail: body.into(),
            timed_out: false,
        }
    }

    /// A success response we could not interpret.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::MalformedResponse,
            status: None,
            detail: detail.into(),
            timed_out: false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::malformed(err.to_string())
        } else if err.is_timeout() {
            Self::idle_timeout(err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

/// Per-frame failure raised by the SSE token decoder.
///
/// [`DecodeError::is_terminal`] tells the consumer whether the sequence ends here.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A `data:` payload that is not valid JSON. Decoding continues.
    #[error("malformed frame on line {line}: {source}")]
    MalformedFrame {
        /// 1-based line number within the stream.
        line: usize,
        /// Parser error.
        #[source]
        source: serde_json::Error,
    },
    /// A line that is not valid UTF-8. Decoding continues.
    #[error("line {line} is not valid utf-8")]
    InvalidUtf8 {
        /// 1-based line number within the stream.
        line: usize,
    },
    /// A single line grew beyond the configured cap. Terminal.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured cap in bytes.
        limit: usize,
    },
    /// The underlying byte stream failed. Terminal.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl DecodeError {
    /// Whether the decoder stops after yielding this error.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::FrameTooLarge { .. } | Self::Upstream(_))
    }

    /// Stable kind name, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::MalformedFrame { .. } => "malformed_frame",
            Self::InvalidUtf8 { .. } => "invalid_utf8",
            Self::FrameTooLarge { .. } => "frame_too_large",
            Self::Upstream(_) => "upstream",
        }
    }
}
