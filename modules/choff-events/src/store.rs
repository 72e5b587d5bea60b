//! Append-only event store backed by SQLite.
//!
//! One row per event; rows are never updated or deleted. The column set is
//! stable for any tool reading the database directly: `event_id`,
//! `timestamp`, `conversation_id`, `correlation_id`, `version`,
//! `event_type`, `payload`.

use serde_json::{json, Value};
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::types::{Event, EventBody, EventMetadata};
use crate::validate::{validate, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Should not occur under v4 id generation, but checked on every append.
    #[error("duplicate event id: {0}")]
    DuplicateEventId(Uuid),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("event payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt event row {event_id}: {reason}")]
    Corrupt { event_id: String, reason: String },

    #[error("event store database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Create the events table and its indexes if they do not exist.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            event_id        TEXT    PRIMARY KEY,
            timestamp       INTEGER NOT NULL,
            conversation_id TEXT    NOT NULL,
            correlation_id  TEXT,
            version         TEXT    NOT NULL,
            event_type      TEXT    NOT NULL,
            payload         TEXT    NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_conversation ON events(conversation_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_correlation ON events(correlation_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Append-only log of conversation events.
#[derive(Clone)]
pub struct EventStore {
    pool: SqlitePool,
}

impl EventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Validate, serialize, and write one event row. Either the full row
    /// exists afterwards or nothing does.
    pub async fn append(&self, event: &Event) -> Result<(), EventStoreError> {
        validate(event)?;
        let (event_type, payload) = serialize_body(&event.body)?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                event_id, timestamp, conversation_id,
                correlation_id, version, event_type, payload
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(event.metadata.event_id.to_string())
        .bind(event.metadata.timestamp)
        .bind(&event.metadata.conversation_id)
        .bind(&event.metadata.correlation_id)
        .bind(&event.metadata.version)
        .bind(&event_type)
        .bind(&payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(
                    event_id = %event.metadata.event_id,
                    conversation_id = %event.metadata.conversation_id,
                    event_type,
                    "event appended"
                );
                Ok(())
            }
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(EventStoreError::DuplicateEventId(event.metadata.event_id))
            }
            Err(e) => Err(EventStoreError::Database(e)),
        }
    }

    /// Events for one conversation, ascending by timestamp with insertion
    /// order breaking same-second ties. `limit` caps the result count but
    /// never reorders.
    pub async fn get_by_conversation(
        &self,
        conversation_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<Event>, EventStoreError> {
        let rows: Vec<EventRow> = match limit {
            Some(limit) => {
                sqlx::query_as(
                    r#"
                    SELECT event_id, timestamp, conversation_id,
                           correlation_id, version, event_type, payload
                    FROM events
                    WHERE conversation_id = ?1
                    ORDER BY timestamp, rowid
                    LIMIT ?2
                    "#,
                )
                .bind(conversation_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT event_id, timestamp, conversation_id,
                           correlation_id, version, event_type, payload
                    FROM events
                    WHERE conversation_id = ?1
                    ORDER BY timestamp, rowid
                    "#,
                )
                .bind(conversation_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.into_iter().map(EventRow::into_event).collect()
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    event_id: String,
    timestamp: i64,
    conversation_id: String,
    correlation_id: Option<String>,
    version: String,
    event_type: String,
    payload: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event, EventStoreError> {
        let event_id = Uuid::parse_str(&self.event_id).map_err(|e| EventStoreError::Corrupt {
            event_id: self.event_id.clone(),
            reason: e.to_string(),
        })?;

        let payload: Value =
            serde_json::from_str(&self.payload).map_err(|e| EventStoreError::Corrupt {
                event_id: self.event_id.clone(),
                reason: e.to_string(),
            })?;

        let body = body_from_payload(&self.event_type, payload).map_err(|reason| {
            EventStoreError::Corrupt {
                event_id: self.event_id.clone(),
                reason,
            }
        })?;

        Ok(Event {
            metadata: EventMetadata {
                event_id,
                timestamp: self.timestamp,
                conversation_id: self.conversation_id,
                correlation_id: self.correlation_id,
                version: self.version,
            },
            body,
        })
    }
}

/// Split the tagged body into the discriminator column and the payload blob.
fn serialize_body(body: &EventBody) -> Result<(String, String), serde_json::Error> {
    let mut value = serde_json::to_value(body)?;
    let event_type = value
        .as_object_mut()
        .and_then(|obj| obj.remove("type"))
        .and_then(|tag| tag.as_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string());
    Ok((event_type, serde_json::to_string(&value)?))
}

/// Rebuild the tagged body from a stored row, upgrading the legacy state
/// payload shape (`state_type`/`intensity`) to the expression form.
fn body_from_payload(event_type: &str, mut payload: Value) -> Result<EventBody, String> {
    let obj = payload
        .as_object_mut()
        .ok_or_else(|| "payload is not an object".to_string())?;

    if event_type == "state" {
        if !obj.contains_key("state_expression") {
            let state_type = obj
                .get("state_type")
                .cloned()
                .ok_or_else(|| "state payload missing state_expression and state_type".to_string())?;
            obj.insert("state_expression".to_string(), state_type);
        }
        if !obj.contains_key("expression_type") {
            obj.insert("expression_type".to_string(), json!("basic"));
        }
    }

    obj.insert("type".to_string(), json!(event_type));
    serde_json::from_value(payload).map_err(|e| e.to_string())
}
