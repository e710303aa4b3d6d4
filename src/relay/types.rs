//! Requests accepted and responses produced by the relay controller.

use std::convert::Infallible;
use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::llm::AudioClip;

/// Body handed to the caller connection. Never fails: upstream trouble after the
/// first byte just ends the stream.
pub type RelayBody = Pin<Box<dyn Stream<Item = Result<Bytes, Infallible>> + Send>>;

/// Media type used when the provider does not name one for audio.
pub const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Text completion request, shared by the sync and streaming paths.
#[derive(Clone, Default, Deserialize)]
pub struct TextRequest {
    /// User message.
    #[serde(default)]
    pub message: String,
    /// Provider credential. Older clients send it as `apiKey`.
    #[serde(default, alias = "apiKey")]
    pub credential: String,
}

impl fmt::Debug for TextRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TextRequest")
            .field("message_chars", &self.message.chars().count())
            .field("has_credential", &!self.credential.trim().is_empty())
            .finish()
    }
}

/// Audio completion request, assembled from a multipart submission.
#[derive(Clone, Default)]
pub struct AudioRequest {
    /// Recorded audio, if any.
    pub audio: Option<AudioClip>,
    /// Accompanying text, if any.
    pub text: Option<String>,
    /// Provider credential.
    pub credential: String,
}

impl fmt::Debug for AudioRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioRequest")
            .field("audio_bytes", &self.audio.as_ref().map(|a| a.bytes.len()))
            .field("has_text", &self.text.is_some())
            .field("has_credential", &!self.credential.trim().is_empty())
            .finish()
    }
}

/// The three request shapes the relay serves.
#[derive(Debug)]
pub enum RelayRequest {
    /// Whole reply at once.
    TextSync(TextRequest),
    /// Reply streamed as text fragments.
    TextStream(TextRequest),
    /// Audio reply streamed as raw bytes.
    AudioStream(AudioRequest),
}

/// Reply to a synchronous text request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextReply {
    /// Model output.
    pub text: String,
    /// Whether the reply can be voiced; always `false` on the text path.
    pub audio_capable: bool,
}

/// A live relay: what to announce to the caller and the bytes to forward.
pub struct StreamRelay {
    /// `Content-Type` for the caller response.
    pub content_type: String,
    /// Forwarded body.
    pub body: RelayBody,
}

impl fmt::Debug for StreamRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamRelay")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Outcome of [`crate::relay::RelayController::handle`].
#[derive(Debug)]
pub enum RelayResponse {
    /// Complete text reply.
    Text(TextReply),
    /// Streaming reply.
    Stream(StreamRelay),
}
