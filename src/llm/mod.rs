//! Upstream LLM provider access.
//!
//! - [`client`]: the provider client (sync, streaming, and audio completions).
//! - [`sse`]: decoder turning an SSE completion stream into text fragments.

pub mod client;
pub mod error;
pub mod sse;
pub mod types;

pub use client::{OpenAiClient, UpstreamClient};
pub use error::{DecodeError, UpstreamError, UpstreamErrorKind};
pub use sse::SseTokenDecoder;
pub use types::{AudioClip, AudioPrompt, AudioStream, ByteStream, Credential, Prompt, PromptMessage};
