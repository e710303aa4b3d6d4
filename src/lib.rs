//! Streaming LLM relay with conversation session persistence.
//!
//! Callers post text or audio to this service; it forwards them to an
//! OpenAI-compatible provider with the caller's credential and streams the reply
//! back as it arrives. Conversations are saved per owner in `SQLite`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(dead_code)]
#![warn(unused_imports)]
#![warn(unused_variables)]
#![deny(unused_must_use)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(non_upper_case_globals)]
#![deny(nonstandard_style)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![deny(overflowing_literals)]
// Clippy
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::missing_const_for_fn)]
#![deny(clippy::unwrap_in_result)]
#![deny(clippy::module_inception)]
#![deny(clippy::redundant_clone)]
#![deny(clippy::shadow_unrelated)]
#![deny(clippy::too_many_arguments)]
#![deny(clippy::cognitive_complexity)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

/// Service configuration.
pub mod config;
/// Upstream provider client and SSE decoding.
pub mod llm;
/// Relay controller tying requests to the provider.
pub mod relay;
/// HTTP server and API routes.
#[allow(
    clippy::missing_errors_doc,
    clippy::missing_const_for_fn,
    clippy::unused_async
)]
pub mod server;
/// Conversation sessions: model, store, and organizer.
pub mod sessions;
/// Entry helpers to start the relay.
pub mod start_relay;

#[cfg(test)]
pub(crate) mod test_utils;
