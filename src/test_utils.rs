//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;

use crate::llm::{AudioPrompt, AudioStream, ByteStream, Credential, Prompt, UpstreamClient, UpstreamError};

/// One SSE frame carrying `content` as a delta.
pub fn sse_frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"index": 0, "delta": {"content": content}}]})
    )
}

enum Script {
    Text(String),
    Chunks(Vec<Bytes>, Option<UpstreamError>),
    Audio(Option<String>, Vec<Bytes>),
    Fail(UpstreamError),
}

/// Scripted [`UpstreamClient`] that counts its calls.
pub struct StubUpstream {
    script: Script,
    calls: AtomicUsize,
    last_model: Mutex<Option<String>>,
    last_audio_parts: Mutex<Option<(bool, bool)>>,
}

impl StubUpstream {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_model: Mutex::new(None),
            last_audio_parts: Mutex::new(None),
        }
    }

    /// Sync completions answer `text`.
    pub fn text(text: &str) -> Self {
        Self::with(Script::Text(text.to_string()))
    }

    /// Streams yield `chunks` then end.
    pub fn chunks(chunks: Vec<String>) -> Self {
        Self::with(Script::Chunks(chunks.into_iter().map(Bytes::from).collect(), None))
    }

    /// Streams yield `chunks` then fail with `error`.
    pub fn chunks_then_error(chunks: Vec<String>, error: UpstreamError) -> Self {
        Self::with(Script::Chunks(chunks.into_iter().map(Bytes::from).collect(), Some(error)))
    }

    /// Audio completions answer with `content_type` and `chunks`.
    pub fn audio(content_type: Option<&str>, chunks: Vec<Vec<u8>>) -> Self {
        Self::with(Script::Audio(
            content_type.map(ToOwned::to_owned),
            chunks.into_iter().map(Bytes::from).collect(),
        ))
    }

    /// Every call fails with `error`.
    pub fn failing(error: UpstreamError) -> Self {
        Self::with(Script::Fail(error))
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Model named in the most recent call.
    pub fn last_model(&self) -> Option<String> {
        self.last_model.lock().unwrap().clone()
    }

    /// `(has_audio, has_text)` of the most recent audio call.
    pub fn last_audio_parts(&self) -> Option<(bool, bool)> {
        *self.last_audio_parts.lock().unwrap()
    }

    fn record(&self, model: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_model.lock().unwrap() = Some(model.to_string());
    }

    fn unexpected(&self) -> UpstreamError {
        match &self.script {
            Script::Fail(err) => err.clone(),
            _ => UpstreamError::malformed("stub not scripted for this call"),
        }
    }
}

fn byte_stream(chunks: Vec<Bytes>, error: Option<UpstreamError>) -> ByteStream {
    let items: Vec<Result<Bytes, UpstreamError>> =
        chunks.into_iter().map(Ok).chain(error.map(Err)).collect();
    Box::pin(futures::stream::iter(items))
}

#[async_trait]
impl UpstreamClient for StubUpstream {
    async fn send_sync(
        &self,
        _prompt: &Prompt,
        _credential: &Credential,
        model: &str,
    ) -> Result<String, UpstreamError> {
        self.record(model);
        match &self.script {
            Script::Text(text) => Ok(text.clone()),
            _ => Err(self.unexpected()),
        }
    }

    async fn open_stream(
        &self,
        _prompt: &Prompt,
        _credential: &Credential,
        model: &str,
    ) -> Result<ByteStream, UpstreamError> {
        self.record(model);
        match &self.script {
            Script::Chunks(chunks, error) => Ok(byte_stream(chunks.clone(), error.clone())),
            _ => Err(self.unexpected()),
        }
    }

    async fn send_audio(
        &self,
        prompt: AudioPrompt,
        _credential: &Credential,
        model: &str,
    ) -> Result<AudioStream, UpstreamError> {
        self.record(model);
        *self.last_audio_parts.lock().unwrap() = Some((prompt.audio().is_some(), prompt.text().is_some()));
        match &self.script {
            Script::Audio(content_type, chunks) => Ok(AudioStream {
                content_type: content_type.clone(),
                body: byte_stream(chunks.clone(), None),
            }),
            _ => Err(self.unexpected()),
        }
    }
}
