use std::env;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use choff_events::EventStore;
use choff_messages::MessageStore;

/// Conversation-core configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub events_db_path: String,
    pub messages_db_path: String,
    /// Default deadline for summarization collaborator calls.
    pub summary_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables, with defaults for
    /// everything. Panics with a clear message on an unparsable value.
    pub fn from_env() -> Self {
        Self {
            events_db_path: env::var("CHOFF_EVENTS_DB")
                .unwrap_or_else(|_| "choff-events.db".to_string()),
            messages_db_path: env::var("CHOFF_MESSAGES_DB")
                .unwrap_or_else(|_| "choff-messages.db".to_string()),
            summary_timeout: Duration::from_secs(
                env::var("CHOFF_SUMMARY_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .expect("CHOFF_SUMMARY_TIMEOUT_SECS must be a number"),
            ),
        }
    }
}

/// Open both stores, creating database files and schema as needed.
///
/// SQLite serializes writers, so each pool holds a single connection. This
/// also keeps `:memory:` paths coherent, where every connection would
/// otherwise see its own private database.
pub async fn open_stores(config: &Config) -> anyhow::Result<(MessageStore, EventStore)> {
    let messages_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&config.messages_db_path)
                .create_if_missing(true)
                .foreign_keys(true),
        )
        .await?;
    choff_messages::migrate(&messages_pool).await?;

    let events_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(
            SqliteConnectOptions::new()
                .filename(&config.events_db_path)
                .create_if_missing(true),
        )
        .await?;
    choff_events::migrate(&events_pool).await?;

    Ok((
        MessageStore::new(messages_pool),
        EventStore::new(events_pool),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env manipulation stays inside this one test so nothing else in the
    // binary can observe the variables mid-change.
    #[test]
    fn from_env_reads_overrides_then_defaults() {
        std::env::set_var("CHOFF_EVENTS_DB", "custom-events.db");
        std::env::set_var("CHOFF_MESSAGES_DB", "custom-messages.db");
        std::env::set_var("CHOFF_SUMMARY_TIMEOUT_SECS", "5");

        let config = Config::from_env();
        assert_eq!(config.events_db_path, "custom-events.db");
        assert_eq!(config.messages_db_path, "custom-messages.db");
        assert_eq!(config.summary_timeout, Duration::from_secs(5));

        std::env::remove_var("CHOFF_EVENTS_DB");
        std::env::remove_var("CHOFF_MESSAGES_DB");
        std::env::remove_var("CHOFF_SUMMARY_TIMEOUT_SECS");

        let config = Config::from_env();
        assert_eq!(config.events_db_path, "choff-events.db");
        assert_eq!(config.messages_db_path, "choff-messages.db");
        assert_eq!(config.summary_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn open_stores_migrates_both_databases() {
        let config = Config {
            events_db_path: ":memory:".to_string(),
            messages_db_path: ":memory:".to_string(),
            summary_timeout: Duration::from_secs(30),
        };

        let (messages, events) = open_stores(&config).await.unwrap();
        assert_eq!(messages.len().await.unwrap(), 0);
        assert!(events.get_by_conversation("conv-1", None).await.unwrap().is_empty());
    }
}
