//! Data model for persisted conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{OwnerId, SessionId};

/// Speaker of a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the conversation.
    User,
    /// The model side. Older clients send `llm`.
    #[serde(alias = "llm")]
    Assistant,
}

/// One message in a session, in conversation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker.
    pub role: Role,
    /// Text content.
    pub content: String,
    /// When the message was produced.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// A stored conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Store-assigned id.
    pub id: SessionId,
    /// Owning identity.
    pub owner_id: OwnerId,
    /// Display title chosen by the client.
    pub title: String,
    /// Messages in conversation order.
    pub messages: Vec<ChatMessage>,
    /// Short description shown in the session list.
    pub summary: String,
    /// Favourite flag.
    pub is_favourite: bool,
    /// Insertion time, set by the store.
    pub created_at: DateTime<Utc>,
}

/// Session as submitted by a client for saving.
///
/// Client-supplied `id`, `ownerId` and `createdAt` are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Messages in conversation order.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Optional summary; derived when blank.
    #[serde(default)]
    pub summary: String,
    /// Favourite flag.
    #[serde(default)]
    pub is_favourite: bool,
}

/// Row of the session list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionListing {
    /// Session id.
    pub id: SessionId,
    /// Summary text.
    pub summary: String,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
    /// Favourite flag.
    pub is_favourite: bool,
}

impl From<&ChatSession> for SessionListing {
    fn from(session: &ChatSession) -> Self {
        Self {
            id: session.id,
            summary: session.summary.clone(),
            created_at: session.created_at,
            is_favourite: session.is_favourite,
        }
    }
}

/// Body of a favourite toggle.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FavouriteUpdate {
    /// New flag value; must be a JSON boolean.
    pub is_favourite: bool,
}
