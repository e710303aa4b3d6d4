//! HTTP client for the upstream LLM provider.
//!
//! Behaviour:
//! - Every call authenticates with the caller's bearer credential; nothing is cached.
//! - Streaming calls hand back the body as soon as the headers arrive.
//! - A non-2xx status is read in full and returned as an [`UpstreamError`], never
//!   forwarded as data.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::llm::error::UpstreamError;
use crate::llm::types::{AudioClip, AudioPrompt, AudioStream, ByteStream, Credential, Prompt, PromptMessage};

/// Chat completion endpoint, relative to the provider base URL.
const CHAT_COMPLETIONS_PATH: &str = "/v1/chat/completions";
/// Audio chat completion endpoint.
const AUDIO_COMPLETIONS_PATH: &str = "/v1/audio/chat/completions";
/// Header carrying the provider API version.
const API_VERSION_HEADER: &str = "OpenAI-Version";

/// Upstream provider operations used by the relay.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    /// Run a non-streaming completion and return the reply text.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-2xx status, or an unreadable body.
    async fn send_sync(
        &self,
        prompt: &Prompt,
        credential: &Credential,
        model: &str,
    ) -> Result<String, UpstreamError>;

    /// Open a streaming completion; the body is SSE-framed.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    async fn open_stream(
        &self,
        prompt: &Prompt,
        credential: &Credential,
        model: &str,
    ) -> Result<ByteStream, UpstreamError>;

    /// Submit an audio completion and stream the raw response body.
    ///
    /// # Errors
    /// Returns an error on transport failure or non-2xx status.
    async fn send_audio(
        &self,
        prompt: AudioPrompt,
        credential: &Credential,
        model: &str,
    ) -> Result<AudioStream, UpstreamError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: Option<CompletionMessage>,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// reqwest-backed client for an OpenAI-compatible provider.
#[derive(Clone, Debug)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_version: String,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl OpenAiClient {
    /// Build a client from provider settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &ProviderConfig) -> Result<Self, UpstreamError> {
        // No overall timeout on the client: streams may legitimately run long.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| UpstreamError::network(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
            request_timeout: config.request_timeout,
            idle_timeout: config.stream_idle_timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorized(&self, builder: RequestBuilder, credential: &Credential) -> RequestBuilder {
        builder
            .bearer_auth(credential.expose())
            .header(API_VERSION_HEADER, &self.api_version)
    }

    /// Send a request, waiting at most the idle timeout for the response headers
    /// and, on a non-2xx status, for the error body.
    async fn send_streaming(&self, builder: RequestBuilder) -> Result<Response, UpstreamError> {
        let response = tokio::time::timeout(self.idle_timeout, builder.send())
            .await
            .map_err(|_| {
                UpstreamError::idle_timeout(format!(
                    "no response headers within {}s",
                    self.idle_timeout.as_secs()
                ))
            })??;
        ensure_success(response, self.idle_timeout).await
    }
}

#[async_trait]
impl UpstreamClient for OpenAiClient {
    async fn send_sync(
        &self,
        prompt: &Prompt,
        credential: &Credential,
        model: &str,
    ) -> Result<String, UpstreamError> {
        let request = CompletionRequest {
            model,
            messages: prompt.messages(),
            stream: false,
        };

        let builder = self
            .client
            .post(self.endpoint(CHAT_COMPLETIONS_PATH))
            .timeout(self.request_timeout)
            .json(&request);
        let response = self.authorized(builder, credential).send().await?;
        let response = ensure_success(response, self.request_timeout).await?;

        let body = response.text().await?;
        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| UpstreamError::malformed(format!("invalid completion body: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or_else(|| UpstreamError::malformed("completion has no choices[0].message.content"))
    }

    async fn open_stream(
        &self,
        prompt: &Prompt,
        credential: &Credential,
        model: &str,
    ) -> Result<ByteStream, UpstreamError> {
        let request = CompletionRequest {
            model,
            messages: prompt.messages(),
            stream: true,
        };

        let builder = self
            .client
            .post(self.endpoint(CHAT_COMPLETIONS_PATH))
            .header(ACCEPT, "text/event-stream")
            .json(&request);
        let response = self.send_streaming(self.authorized(builder, credential)).await?;

        tracing::debug!(model, "upstream completion stream opened");
        Ok(idle_guarded(response, self.idle_timeout))
    }

    async fn send_audio(
        &self,
        prompt: AudioPrompt,
        credential: &Credential,
        model: &str,
    ) -> Result<AudioStream, UpstreamError> {
        let form = audio_form(prompt, model)?;

        let builder = self
            .client
            .post(self.endpoint(AUDIO_COMPLETIONS_PATH))
            .multipart(form);
        let response = self.send_streaming(self.authorized(builder, credential)).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToOwned::to_owned);
        tracing::debug!(model, content_type = ?content_type, "upstream audio stream opened");

        Ok(AudioStream {
            content_type,
            body: idle_guarded(response, self.idle_timeout),
        })
    }
}

/// Build the multipart payload for the audio endpoint.
fn audio_form(prompt: AudioPrompt, model: &str) -> Result<Form, UpstreamError> {
    let mut form = Form::new();

    let (audio, text) = match prompt {
        AudioPrompt::Audio(audio) => (Some(audio), None),
        AudioPrompt::Text(text) => (None, Some(text)),
        AudioPrompt::Both(audio, text) => (Some(audio), Some(text)),
    };

    if let Some(AudioClip {
        bytes,
        file_name,
        content_type,
    }) = audio
    {
        let length = bytes.len() as u64;
        let mut part = Part::stream_with_length(bytes, length)
            .file_name(file_name.unwrap_or_else(|| AudioClip::DEFAULT_FILE_NAME.to_string()));
        if let Some(content_type) = content_type {
            part = part
                .mime_str(&content_type)
                .map_err(|e| UpstreamError::network(format!("invalid audio media type: {e}")))?;
        }
        form = form.part("audio", part);
    }
    if let Some(text) = text {
        form = form.text("text", text);
    }

    Ok(form
        .text("model", model.to_string())
        .text("stream", "true"))
}

/// Turn a non-2xx response into an error carrying the provider's status and body.
///
/// The body read is bounded by `wait`; a provider that stalls mid-body yields a
/// timed-out error that still carries the status.
async fn ensure_success(response: Response, wait: Duration) -> Result<Response, UpstreamError> {
    let status = response.status().as_u16();
    if response.status().is_success() {
        return Ok(response);
    }

    tracing::warn!(status, "upstream returned an error status");
    match tokio::time::timeout(wait, response.text()).await {
        Ok(Ok(body)) => Err(UpstreamError::from_status(status, body)),
        Ok(Err(err)) => {
            tracing::warn!(status, "failed to read upstream error body: {err}");
            Err(UpstreamError::from_status(status, format!("unreadable error body: {err}")))
        }
        Err(_) => Err(UpstreamError {
            status: Some(status),
            ..UpstreamError::idle_timeout(format!(
                "error body stalled for more than {}s",
                wait.as_secs()
            ))
        }),
    }
}

/// Wrap a response body so that a silent upstream ends the stream with a `network` error.
fn idle_guarded(response: Response, idle: Duration) -> ByteStream {
    let body = Box::pin(response.bytes_stream());
    Box::pin(futures::stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(err))) => Some((Err(UpstreamError::from(err)), None)),
            Ok(None) => None,
            Err(_) => Some((
                Err(UpstreamError::idle_timeout(format!(
                    "upstream idle for {}s",
                    idle.as_secs()
                ))),
                None,
            )),
        }
    }))
}
