//! Relay controller: validates caller requests, calls the provider, and forwards
//! the reply.
//!
//! Validation always happens before the upstream is contacted. Upstream failures
//! that happen before the first forwarded byte come back as errors; failures after
//! that end the forwarded stream quietly, leaving the caller with a valid prefix.

pub mod types;

pub use types::{
    AudioRequest, RelayBody, RelayRequest, RelayResponse, StreamRelay, TextReply, TextRequest,
    DEFAULT_AUDIO_CONTENT_TYPE,
};

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use thiserror::Error;

use crate::config::ProviderConfig;
use crate::llm::{AudioPrompt, ByteStream, Credential, Prompt, SseTokenDecoder, UpstreamClient, UpstreamError};

/// Content type announced on the text streaming path.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

const MISSING_TEXT_FIELDS: &str = "Missing required fields.";
const MISSING_CREDENTIAL: &str = "Missing API key";
const MISSING_AUDIO_INPUT: &str = "Missing audio or text input";

/// Errors returned by the relay before anything was forwarded.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Caller input is missing or malformed; the upstream was not contacted.
    #[error("{0}")]
    Validation(String),
    /// The provider call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Orchestrates the upstream client and the SSE decoder for each request shape.
#[derive(Clone)]
pub struct RelayController {
    upstream: Arc<dyn UpstreamClient>,
    text_model: String,
    audio_model: String,
    max_frame_bytes: usize,
}

impl RelayController {
    /// Create a controller over an upstream client.
    #[must_use]
    pub fn new(upstream: Arc<dyn UpstreamClient>, config: &ProviderConfig) -> Self {
        Self {
            upstream,
            text_model: config.text_model.clone(),
            audio_model: config.audio_model.clone(),
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Dispatch any request shape.
    ///
    /// # Errors
    /// See the individual handlers.
    pub async fn handle(&self, request: RelayRequest) -> Result<RelayResponse, RelayError> {
        match request {
            RelayRequest::TextSync(request) => self.handle_text_sync(request).await.map(RelayResponse::Text),
            RelayRequest::TextStream(request) => {
                self.handle_text_stream(request).await.map(RelayResponse::Stream)
            }
            RelayRequest::AudioStream(request) => {
                self.handle_audio_stream(request).await.map(RelayResponse::Stream)
            }
        }
    }

    /// Run a completion and return the whole reply.
    ///
    /// # Errors
    /// Returns [`RelayError::Validation`] for a blank message or credential, and
    /// [`RelayError::Upstream`] if the provider call fails.
    pub async fn handle_text_sync(&self, request: TextRequest) -> Result<TextReply, RelayError> {
        let (prompt, credential) = validate_text(request)?;

        let text = self
            .upstream
            .send_sync(&prompt, &credential, &self.text_model)
            .await
            .inspect_err(|e| tracing::warn!(kind = %e.kind, status = ?e.status, "sync completion failed"))?;

        Ok(TextReply {
            text,
            audio_capable: false,
        })
    }

    /// Open a completion stream and forward its text fragments as they arrive.
    ///
    /// # Errors
    /// Returns [`RelayError::Validation`] for a blank message or credential, and
    /// [`RelayError::Upstream`] if the stream cannot be opened (including a non-2xx
    /// provider status). Nothing has been forwarded in either case.
    pub async fn handle_text_stream(&self, request: TextRequest) -> Result<StreamRelay, RelayError> {
        let (prompt, credential) = validate_text(request)?;

        let upstream = self
            .upstream
            .open_stream(&prompt, &credential, &self.text_model)
            .await
            .inspect_err(|e| tracing::warn!(kind = %e.kind, status = ?e.status, "completion stream failed to open"))?;

        let decoder = SseTokenDecoder::new(upstream, self.max_frame_bytes);
        Ok(StreamRelay {
            content_type: EVENT_STREAM_CONTENT_TYPE.to_string(),
            body: forward_fragments(decoder),
        })
    }

    /// Submit audio and/or text and forward the provider's audio bytes untouched.
    ///
    /// # Errors
    /// Returns [`RelayError::Validation`] when the credential is blank or both audio
    /// and text are missing, and [`RelayError::Upstream`] if the call fails.
    pub async fn handle_audio_stream(&self, request: AudioRequest) -> Result<StreamRelay, RelayError> {
        let credential = Credential::new(request.credential)
            .ok_or_else(|| RelayError::Validation(MISSING_CREDENTIAL.to_string()))?;
        let prompt = AudioPrompt::from_parts(request.audio, request.text)
            .ok_or_else(|| RelayError::Validation(MISSING_AUDIO_INPUT.to_string()))?;

        let upstream = self
            .upstream
            .send_audio(prompt, &credential, &self.audio_model)
            .await
            .inspect_err(|e| tracing::warn!(kind = %e.kind, status = ?e.status, "audio completion failed"))?;

        let content_type = upstream
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUDIO_CONTENT_TYPE.to_string());

        Ok(StreamRelay {
            content_type,
            body: forward_bytes(upstream.body),
        })
    }
}

fn validate_text(request: TextRequest) -> Result<(Prompt, Credential), RelayError> {
    if request.message.trim().is_empty() {
        return Err(RelayError::Validation(MISSING_TEXT_FIELDS.to_string()));
    }
    let credential = Credential::new(request.credential)
        .ok_or_else(|| RelayError::Validation(MISSING_TEXT_FIELDS.to_string()))?;
    Ok((Prompt::user(request.message), credential))
}

/// Forward decoded fragments one by one; skip bad frames, stop on terminal errors.
fn forward_fragments(decoder: SseTokenDecoder) -> RelayBody {
    Box::pin(futures::stream::unfold((decoder, 0_usize), |(mut decoder, forwarded)| async move {
        loop {
            match decoder.next_fragment().await {
                Some(Ok(fragment)) => return Some((Ok(Bytes::from(fragment)), (decoder, forwarded + 1))),
                Some(Err(err)) if err.is_terminal() => {
                    tracing::warn!(kind = err.kind(), forwarded, "completion stream ended early: {err}");
                    return None;
                }
                Some(Err(err)) => {
                    tracing::debug!(kind = err.kind(), "skipping undecodable frame: {err}");
                }
                None => {
                    tracing::debug!(forwarded, lines = decoder.lines_read(), "completion stream finished");
                    return None;
                }
            }
        }
    }))
}

/// Forward raw bytes in order until EOF; an upstream failure ends the body.
fn forward_bytes(upstream: ByteStream) -> RelayBody {
    Box::pin(futures::stream::unfold((upstream, 0_usize), |(mut upstream, forwarded)| async move {
        match upstream.next().await {
            Some(Ok(chunk)) => {
                let forwarded = forwarded + chunk.len();
                Some((Ok(chunk), (upstream, forwarded)))
            }
            Some(Err(err)) => {
                tracing::warn!(kind = %err.kind, forwarded, "audio stream ended early: {err}");
                None
            }
            None => {
                tracing::debug!(forwarded, "audio stream finished");
                None
            }
        }
    }))
}
