//! Values exchanged with the upstream provider.

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;
use serde::Serialize;

use crate::llm::error::UpstreamError;
use crate::sessions::types::Role;

/// Live upstream body, yielded chunk by chunk as it arrives.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

/// Bearer credential supplied per request.
///
/// Never stored and never logged: `Debug` is redacted and there is no `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Wrap a credential, rejecting blank input.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    /// The secret itself, for building the `Authorization` header.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// One message sent to the provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    /// Speaker.
    pub role: Role,
    /// Text content.
    pub content: String,
}

/// Non-empty list of messages for a chat completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prompt(Vec<PromptMessage>);

impl Prompt {
    /// Build a prompt; `None` when `messages` is empty.
    #[must_use]
    pub fn new(messages: Vec<PromptMessage>) -> Option<Self> {
        if messages.is_empty() {
            None
        } else {
            Some(Self(messages))
        }
    }

    /// Single user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self(vec![PromptMessage {
            role: Role::User,
            content: content.into(),
        }])
    }

    /// Messages in conversation order.
    #[must_use]
    pub fn messages(&self) -> &[PromptMessage] {
        &self.0
    }
}

/// Recorded audio uploaded by the caller.
#[derive(Clone, Debug)]
pub struct AudioClip {
    /// Raw media bytes.
    pub bytes: Bytes,
    /// Original filename, forwarded to the provider.
    pub file_name: Option<String>,
    /// Media type reported by the caller.
    pub content_type: Option<String>,
}

impl AudioClip {
    /// Default filename when the caller sent none.
    pub const DEFAULT_FILE_NAME: &'static str = "audio.webm";
}

/// Input for an audio completion: audio, text, or both, never neither.
#[derive(Clone, Debug)]
pub enum AudioPrompt {
    /// Audio only.
    Audio(AudioClip),
    /// Text only.
    Text(String),
    /// Audio with an accompanying text message.
    Both(AudioClip, String),
}

impl AudioPrompt {
    /// Combine optional parts; `None` when both are missing.
    #[must_use]
    pub fn from_parts(audio: Option<AudioClip>, text: Option<String>) -> Option<Self> {
        let text = text.filter(|t| !t.trim().is_empty());
        let audio = audio.filter(|a| !a.bytes.is_empty());
        match (audio, text) {
            (Some(audio), Some(text)) => Some(Self::Both(audio, text)),
            (Some(audio), None) => Some(Self::Audio(audio)),
            (None, Some(text)) => Some(Self::Text(text)),
            (None, None) => None,
        }
    }

    /// The audio part, if any.
    #[must_use]
    pub const fn audio(&self) -> Option<&AudioClip> {
        match self {
            Self::Audio(audio) | Self::Both(audio, _) => Some(audio),
            Self::Text(_) => None,
        }
    }

    /// The text part, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Both(_, text) => Some(text),
            Self::Audio(_) => None,
        }
    }
}

/// Streaming audio response: upstream content type plus the live body.
pub struct AudioStream {
    /// `Content-Type` reported by the provider, if any.
    pub content_type: Option<String>,
    /// Raw body.
    pub body: ByteStream,
}

impl fmt::Debug for AudioStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioStream")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}
