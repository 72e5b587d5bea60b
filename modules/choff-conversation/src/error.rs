use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use choff_events::EventStoreError;
use choff_messages::MessageStoreError;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Messages(#[from] MessageStoreError),

    #[error(transparent)]
    Events(#[from] EventStoreError),

    #[error("no messages found to summarize")]
    NoMessagesToSummarize,

    #[error("summarizer not configured")]
    SummarizerUnavailable,

    #[error("summary {0} not found")]
    SummaryNotFound(Uuid),

    /// Distinct from generic failure so callers can decide to retry. The
    /// summary stays Pending; nothing was recorded.
    #[error("summarization timed out after {0:?}")]
    Timeout(Duration),
}
