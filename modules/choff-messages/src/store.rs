//! SQLite-backed message store. Two tables: `messages` holds the rows,
//! `tags` holds one row per tag occurrence with its original position.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::types::{Message, Speaker};

#[derive(Debug, thiserror::Error)]
pub enum MessageStoreError {
    #[error("message {0} not found")]
    NotFound(i64),

    #[error("corrupt message row {id}: {reason}")]
    Corrupt { id: i64, reason: String },

    #[error("message store database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create the messages and tags tables if they do not exist.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id        INTEGER PRIMARY KEY AUTOINCREMENT,
            speaker   TEXT NOT NULL,
            content   TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            message_id INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            tag        TEXT    NOT NULL,
            position   INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_message ON tags(message_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Durable, tag-indexed message persistence. Ids are store-assigned and
/// monotonically increasing. All reads return owned copies.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a message and its full tag list in one transaction.
    pub async fn add(&self, message: &Message) -> Result<i64, MessageStoreError> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("INSERT INTO messages (speaker, content, timestamp) VALUES (?1, ?2, ?3)")
                .bind(message.speaker.as_str())
                .bind(&message.content)
                .bind(message.timestamp)
                .execute(&mut *tx)
                .await?;
        let id = result.last_insert_rowid();

        for (position, tag) in message.choff_tags.iter().enumerate() {
            sqlx::query("INSERT INTO tags (message_id, tag, position) VALUES (?1, ?2, ?3)")
                .bind(id)
                .bind(tag)
                .bind(position as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(id, tags = message.choff_tags.len(), "message stored");
        Ok(id)
    }

    /// Fetch a message by id.
    pub async fn get(&self, id: i64) -> Result<Message, MessageStoreError> {
        self.fetch(id).await?.ok_or(MessageStoreError::NotFound(id))
    }

    /// Remove a message and all its tag rows atomically.
    pub async fn delete(&self, id: i64) -> Result<(), MessageStoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM tags WHERE message_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MessageStoreError::NotFound(id));
        }

        tx.commit().await?;
        debug!(id, "message deleted");
        Ok(())
    }

    /// All messages carrying the exact tag, ascending by message id.
    /// A message matches once even when the tag occurs on it repeatedly.
    pub async fn find_by_tag(&self, tag: &str) -> Result<Vec<Message>, MessageStoreError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT m.id
            FROM messages m
            JOIN tags t ON t.message_id = m.id
            WHERE t.tag = ?1
            ORDER BY m.id
            "#,
        )
        .bind(tag)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = Vec::with_capacity(ids.len());
        for (id,) in ids {
            if let Some(message) = self.fetch(id).await? {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    /// Every stored message with its id, ascending by id.
    pub async fn list(&self) -> Result<Vec<(i64, Message)>, MessageStoreError> {
        let ids: Vec<(i64,)> = sqlx::query_as("SELECT id FROM messages ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        let mut messages = Vec::with_capacity(ids.len());
        for (id,) in ids {
            if let Some(message) = self.fetch(id).await? {
                messages.push((id, message));
            }
        }
        Ok(messages)
    }

    /// Number of stored messages.
    pub async fn len(&self) -> Result<i64, MessageStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn is_empty(&self) -> Result<bool, MessageStoreError> {
        Ok(self.len().await? == 0)
    }

    async fn fetch(&self, id: i64) -> Result<Option<Message>, MessageStoreError> {
        let row: Option<(String, String, DateTime<Utc>)> =
            sqlx::query_as("SELECT speaker, content, timestamp FROM messages WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        let Some((speaker, content, timestamp)) = row else {
            return Ok(None);
        };

        let speaker = match speaker.as_str() {
            "user" => Speaker::User,
            "assistant" => Speaker::Assistant,
            other => {
                return Err(MessageStoreError::Corrupt {
                    id,
                    reason: format!("unknown speaker {other:?}"),
                })
            }
        };

        let tags: Vec<(String,)> =
            sqlx::query_as("SELECT tag FROM tags WHERE message_id = ?1 ORDER BY position")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;

        Ok(Some(Message {
            speaker,
            content,
            choff_tags: tags.into_iter().map(|(tag,)| tag).collect(),
            timestamp,
        }))
    }
}
