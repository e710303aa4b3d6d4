//! SQLite-backed session store.
//!
//! Each session is one row: scalar metadata in columns, the message list as a
//! JSON document. Every operation touches a single row.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::config::StorageConfig;

use super::ids::{OwnerId, SessionId};
use super::organizer;
use super::types::{ChatMessage, ChatSession, NewSession, SessionListing};

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Error type for session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No session with this id.
    #[error("session {0} not found")]
    NotFound(SessionId),
    /// `SQLite` storage error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    /// Message document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// A stored row holds values we cannot interpret.
    #[error("invalid session record: {0}")]
    InvalidRecord(String),
}

/// Result type for session store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for chat sessions.
pub trait SessionStore: Send + Sync {
    /// Sessions of `owner`, newest first.
    fn list_by_owner(&self, owner: &OwnerId) -> StoreFuture<'_, StoreResult<Vec<SessionListing>>>;

    /// Fetch a full session.
    ///
    /// Unknown ids yield [`StoreError::NotFound`].
    fn get(&self, id: SessionId) -> StoreFuture<'_, StoreResult<ChatSession>>;

    /// Persist a new session for `owner`, assigning its id and creation time.
    ///
    /// A blank summary is derived from the messages and title.
    fn insert(&self, owner: &OwnerId, session: NewSession) -> StoreFuture<'_, StoreResult<ChatSession>>;

    /// Set the favourite flag.
    ///
    /// Unknown ids yield [`StoreError::NotFound`].
    fn set_favourite(&self, id: SessionId, is_favourite: bool) -> StoreFuture<'_, StoreResult<()>>;
}

/// Raw row as read from `SQLite`.
struct SessionRow {
    id: String,
    owner_id: String,
    title: String,
    summary: String,
    is_favourite: bool,
    created_at: i64,
    messages: String,
}

impl SessionRow {
    fn into_session(self) -> StoreResult<ChatSession> {
        let id = self
            .id
            .parse::<SessionId>()
            .map_err(|e| StoreError::InvalidRecord(format!("bad id {}: {e}", self.id)))?;
        let owner_id = OwnerId::new(self.owner_id)
            .ok_or_else(|| StoreError::InvalidRecord(format!("session {id} has no owner")))?;
        let messages: Vec<ChatMessage> = serde_json::from_str(&self.messages)?;

        Ok(ChatSession {
            id,
            owner_id,
            title: self.title,
            messages,
            summary: self.summary,
            is_favourite: self.is_favourite,
            created_at: from_millis(self.created_at)?,
        })
    }
}

fn from_millis(ms: i64) -> StoreResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::InvalidRecord(format!("invalid created_at timestamp {ms}")))
}

/// `SQLite` implementation of [`SessionStore`].
pub struct SqliteSessionStore {
    conn: Connection,
    table: String,
}

impl SqliteSessionStore {
    /// Table name for sessions.
    pub const DEFAULT_TABLE: &'static str = "chat_sessions";

    /// Open (or create) the database file named in `config`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub async fn open(config: &StorageConfig) -> StoreResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::new(conn).await
    }

    /// Throwaway in-memory database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be created.
    pub async fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::new(conn).await
    }

    /// Initialize the store on an open connection and create the table if it doesn't exist.
    ///
    /// # Errors
    /// Returns an error if database operations fail.
    pub async fn new(conn: Connection) -> StoreResult<Self> {
        let table = Self::DEFAULT_TABLE.to_string();
        let table_name = table.clone();

        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id TEXT PRIMARY KEY,
                    owner_id TEXT NOT NULL,
                    title TEXT NOT NULL DEFAULT '',
                    summary TEXT NOT NULL DEFAULT '',
                    is_favourite INTEGER NOT NULL DEFAULT 0,
                    created_at INTEGER NOT NULL,
                    messages TEXT NOT NULL DEFAULT '[]'
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_owner
                    ON {table_name} (owner_id, created_at DESC);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

impl SessionStore for SqliteSessionStore {
    fn list_by_owner(&self, owner: &OwnerId) -> StoreFuture<'_, StoreResult<Vec<SessionListing>>> {
        let owner = owner.as_str().to_string();
        Box::pin(async move {
            let table = self.table.clone();
            let rows = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, summary, created_at, is_favourite
                         FROM {table}
                         WHERE owner_id = ?1
                         ORDER BY created_at DESC, rowid DESC"
                    ))?;
                    let rows = stmt
                        .query_map([&owner], |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, i64>(2)?,
                                row.get::<_, bool>(3)?,
                            ))
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(rows)
                })
                .await?;

            rows.into_iter()
                .map(|(id, summary, created_at, is_favourite)| -> StoreResult<SessionListing> {
                    Ok(SessionListing {
                        id: id
                            .parse::<SessionId>()
                            .map_err(|e| StoreError::InvalidRecord(format!("bad id {id}: {e}")))?,
                        summary,
                        created_at: from_millis(created_at)?,
                        is_favourite,
                    })
                })
                .collect()
        })
    }

    fn get(&self, id: SessionId) -> StoreFuture<'_, StoreResult<ChatSession>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = id.to_string();
            let row = self
                .conn
                .call(move |conn| {
                    let row = conn
                        .query_row(
                            &format!(
                                "SELECT id, owner_id, title, summary, is_favourite, created_at, messages
                                 FROM {table}
                                 WHERE id = ?1"
                            ),
                            [&id_str],
                            |row| {
                                Ok(SessionRow {
                                    id: row.get(0)?,
                                    owner_id: row.get(1)?,
                                    title: row.get(2)?,
                                    summary: row.get(3)?,
                                    is_favourite: row.get(4)?,
                                    created_at: row.get(5)?,
                                    messages: row.get(6)?,
                                })
                            },
                        )
                        .optional()?;
                    Ok(row)
                })
                .await?;

            row.ok_or(StoreError::NotFound(id))?.into_session()
        })
    }

    fn insert(&self, owner: &OwnerId, session: NewSession) -> StoreFuture<'_, StoreResult<ChatSession>> {
        let owner = owner.clone();
        Box::pin(async move {
            let table = self.table.clone();
            let id = SessionId::new();
            // Millisecond precision, so the returned value matches what `get` reads back.
            let created_at = from_millis(Utc::now().timestamp_millis())?;

            let summary = if session.summary.trim().is_empty() {
                organizer::derive_summary(&session.title, &session.messages)
            } else {
                session.summary
            };
            let stored = ChatSession {
                id,
                owner_id: owner,
                title: session.title,
                messages: session.messages,
                summary,
                is_favourite: session.is_favourite,
                created_at,
            };

            let params = (
                stored.id.to_string(),
                stored.owner_id.as_str().to_string(),
                stored.title.clone(),
                stored.summary.clone(),
                stored.is_favourite,
                stored.created_at.timestamp_millis(),
                serde_json::to_string(&stored.messages)?,
            );
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (id, owner_id, title, summary, is_favourite, created_at, messages)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                        ),
                        params,
                    )?;
                    Ok(())
                })
                .await?;

            tracing::debug!(session_id = %stored.id, messages = stored.messages.len(), "session saved");
            Ok(stored)
        })
    }

    fn set_favourite(&self, id: SessionId, is_favourite: bool) -> StoreFuture<'_, StoreResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            let id_str = id.to_string();
            let updated = self
                .conn
                .call(move |conn| {
                    let updated = conn.execute(
                        &format!("UPDATE {table} SET is_favourite = ?1 WHERE id = ?2"),
                        rusqlite::params![is_favourite, id_str],
                    )?;
                    Ok(updated)
                })
                .await?;

            if updated == 0 {
                return Err(StoreError::NotFound(id));
            }
            Ok(())
        })
    }
}
