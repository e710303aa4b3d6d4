//! Conversation persistence.
//!
//! This module provides the session data model, the store, and the pure
//! helpers that derive summaries and recency groups for display.

pub mod ids;
pub mod organizer;
pub mod store;
pub mod types;

pub use ids::{OwnerId, SessionId};
pub use organizer::{derive_summary, group_by_recency, RecencyBucket, RecencyGroups};
pub use store::{SessionStore, SqliteSessionStore, StoreError, StoreResult};
pub use types::{ChatMessage, ChatSession, FavouriteUpdate, NewSession, Role, SessionListing};
