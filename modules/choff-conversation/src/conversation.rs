//! The conversation reducer/orchestrator.
//!
//! Every write operation performs a dual write: the durable store mutation
//! first, then the event append, then the bus publish. The in-memory CHOFF
//! state and its transition history live on the instance, never in
//! process-wide storage.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use choff_events::{validate, ErrorSeverity, Event, EventStore, EventStoreError, StateExpression};
use choff_messages::{Message, MessageStore, MessageStoreError, Speaker};

use crate::bus::EventBus;
use crate::error::ConversationError;
use crate::summarize::Summarize;

/// Current CHOFF state: state type to value.
pub type StateMap = BTreeMap<String, f64>;

/// Immutable snapshot appended on every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionRecord {
    pub previous: StateMap,
    pub new: StateMap,
    pub transition_type: String,
    pub timestamp: DateTime<Utc>,
}

/// Caller-facing read model for stored messages.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub id: i64,
    pub content: String,
    pub role: String,
    pub timestamp: DateTime<Utc>,
    pub choff_tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub id: Uuid,
    pub status: SummaryStatus,
    pub content: Option<String>,
    pub error: Option<String>,
    pub requested_at: DateTime<Utc>,
    source_contents: Vec<String>,
}

struct Inner {
    choff_state: StateMap,
    transitions: Vec<TransitionRecord>,
    summaries: HashMap<Uuid, Summary>,
}

pub struct Conversation {
    conversation_id: String,
    messages: MessageStore,
    events: EventStore,
    bus: Arc<EventBus>,
    summarizer: Option<Arc<dyn Summarize>>,
    inner: Mutex<Inner>,
}

impl Conversation {
    pub fn new(
        conversation_id: impl Into<String>,
        messages: MessageStore,
        events: EventStore,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages,
            events,
            bus,
            summarizer: None,
            inner: Mutex::new(Inner {
                choff_state: StateMap::new(),
                transitions: Vec::new(),
                summaries: HashMap::new(),
            }),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarize>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Store a message tagged with the current CHOFF state (flattened to
    /// `"type:value"` strings) and record it as a Message event.
    ///
    /// The event is validated before the store write, so a rejected call
    /// leaves nothing behind in either store.
    pub async fn add_message(
        &self,
        content: impl Into<String>,
        role: &str,
    ) -> Result<i64, ConversationError> {
        let content = content.into();
        let event = Event::message(&self.conversation_id, content.clone(), Some(role.to_string()));
        validate(&event).map_err(EventStoreError::from)?;

        let choff_tags: Vec<String> = {
            let inner = self.lock();
            inner
                .choff_state
                .iter()
                .map(|(state_type, value)| format!("{state_type}:{value}"))
                .collect()
        };

        let message = Message::new(
            Speaker::from_role(role),
            content,
            choff_tags,
            Utc::now(),
        );
        let id = self.messages.add(&message).await?;

        let event = event.with_correlation_id(id.to_string());
        self.events.append(&event).await?;
        self.bus.publish(&event);

        Ok(id)
    }

    /// Remove a message. `Ok(false)` when the id does not exist; absence
    /// is not an error here. Deletion is recorded as a Message event with
    /// source `"delete"` carrying the removed content.
    pub async fn delete_message(&self, id: i64) -> Result<bool, ConversationError> {
        let existing = match self.messages.get(id).await {
            Ok(message) => message,
            Err(MessageStoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        match self.messages.delete(id).await {
            Ok(()) => {}
            Err(MessageStoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let event = Event::message(
            &self.conversation_id,
            existing.content,
            Some("delete".to_string()),
        )
        .with_correlation_id(id.to_string());
        self.events.append(&event).await?;
        self.bus.publish(&event);

        Ok(true)
    }

    /// Messages filtered by time window and role, ascending by timestamp.
    pub async fn get_messages(
        &self,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        role: Option<&str>,
    ) -> Result<Vec<StoredMessage>, ConversationError> {
        let mut result = Vec::new();
        for (id, message) in self.messages.list().await? {
            if start_time.is_some_and(|t| message.timestamp < t) {
                continue;
            }
            if end_time.is_some_and(|t| message.timestamp > t) {
                continue;
            }
            if role.is_some_and(|r| !message.speaker.as_str().eq_ignore_ascii_case(r)) {
                continue;
            }
            result.push(StoredMessage {
                id,
                role: message.speaker.as_str().to_string(),
                content: message.content,
                timestamp: message.timestamp,
                choff_tags: message.choff_tags,
            });
        }
        result.sort_by_key(|m| m.timestamp);
        Ok(result)
    }

    /// Replace the current CHOFF state, append a transition record, and
    /// record the change as a State event. The swap and the transition
    /// append happen inside a single critical section.
    ///
    /// The State event is validated first (non-empty type names, values in
    /// [0,1]), so a rejected map never touches the current state or the
    /// transition history.
    pub async fn update_choff_state(
        &self,
        new_state: StateMap,
        transition_type: impl Into<String>,
    ) -> Result<(), ConversationError> {
        let transition_type = transition_type.into();
        let event = Event::state(
            &self.conversation_id,
            StateExpression::Components(new_state.clone()),
            "intensity",
            Some(transition_type.clone()),
        );
        validate(&event).map_err(EventStoreError::from)?;

        {
            let mut inner = self.lock();
            let previous = std::mem::replace(&mut inner.choff_state, new_state.clone());
            inner.transitions.push(TransitionRecord {
                previous,
                new: new_state,
                transition_type,
                timestamp: Utc::now(),
            });
        }

        self.events.append(&event).await?;
        self.bus.publish(&event);

        Ok(())
    }

    /// Owned snapshot of the current CHOFF state.
    pub fn choff_state(&self) -> StateMap {
        self.lock().choff_state.clone()
    }

    /// Owned snapshot of the transition history.
    pub fn transitions(&self) -> Vec<TransitionRecord> {
        self.lock().transitions.clone()
    }

    /// Resolve the source messages, record the request, and hold a Pending
    /// summary. `message_ids` wins over the time range when both are given.
    pub async fn request_summary(
        &self,
        message_ids: Option<Vec<i64>>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<Uuid, ConversationError> {
        if self.summarizer.is_none() {
            return Err(ConversationError::SummarizerUnavailable);
        }

        let contents = match message_ids {
            Some(ids) => {
                let mut out = Vec::new();
                for id in ids {
                    match self.messages.get(id).await {
                        Ok(message) => out.push(message.content),
                        Err(MessageStoreError::NotFound(_)) => continue,
                        Err(e) => return Err(e.into()),
                    }
                }
                out
            }
            None => self
                .get_messages(start_time, end_time, None)
                .await?
                .into_iter()
                .map(|m| m.content)
                .collect(),
        };
        if contents.is_empty() {
            return Err(ConversationError::NoMessagesToSummarize);
        }

        let summary_id = Uuid::new_v4();
        let event = Event::message(
            &self.conversation_id,
            format!("summary requested for {} messages", contents.len()),
            Some("summarizer".to_string()),
        )
        .with_correlation_id(summary_id.to_string());
        self.events.append(&event).await?;
        self.bus.publish(&event);

        let mut inner = self.lock();
        inner.summaries.insert(
            summary_id,
            Summary {
                id: summary_id,
                status: SummaryStatus::Pending,
                content: None,
                error: None,
                requested_at: Utc::now(),
                source_contents: contents,
            },
        );

        Ok(summary_id)
    }

    /// Fetch a summary, driving a Pending one through the collaborator.
    ///
    /// Success moves it to Completed and records the text as a Message
    /// event; a collaborator error moves it to Failed with the error
    /// captured and records an Error event. A deadline hit reports
    /// [`ConversationError::Timeout`] and leaves everything, status
    /// included, exactly as it was, so a later call may retry.
    pub async fn get_summary(
        &self,
        summary_id: Uuid,
        timeout: Option<Duration>,
    ) -> Result<Summary, ConversationError> {
        let source_contents = {
            let inner = self.lock();
            let summary = inner
                .summaries
                .get(&summary_id)
                .ok_or(ConversationError::SummaryNotFound(summary_id))?;
            match summary.status {
                SummaryStatus::Pending => summary.source_contents.clone(),
                _ => return Ok(summary.clone()),
            }
        };

        let Some(summarizer) = self.summarizer.clone() else {
            return Err(ConversationError::SummarizerUnavailable);
        };

        let call = summarizer.summarize(source_contents);
        let outcome = match timeout {
            Some(deadline) => match tokio::time::timeout(deadline, call).await {
                Ok(outcome) => outcome,
                Err(_) => return Err(ConversationError::Timeout(deadline)),
            },
            None => call.await,
        };

        match outcome {
            Ok(content) => {
                let event = Event::message(
                    &self.conversation_id,
                    content.clone(),
                    Some("summarizer".to_string()),
                )
                .with_correlation_id(summary_id.to_string());
                self.events.append(&event).await?;
                self.bus.publish(&event);

                self.finish_summary(summary_id, |summary| {
                    summary.status = SummaryStatus::Completed;
                    summary.content = Some(content);
                })
            }
            Err(error) => {
                let event = Event::error(
                    &self.conversation_id,
                    "SummarizationFailed",
                    error.to_string(),
                    ErrorSeverity::Error,
                )
                .with_correlation_id(summary_id.to_string());
                self.events.append(&event).await?;
                self.bus.publish(&event);

                self.finish_summary(summary_id, |summary| {
                    summary.status = SummaryStatus::Failed;
                    summary.error = Some(error.to_string());
                })
            }
        }
    }

    fn finish_summary(
        &self,
        summary_id: Uuid,
        apply: impl FnOnce(&mut Summary),
    ) -> Result<Summary, ConversationError> {
        let mut inner = self.lock();
        let summary = inner
            .summaries
            .get_mut(&summary_id)
            .ok_or(ConversationError::SummaryNotFound(summary_id))?;
        apply(summary);
        Ok(summary.clone())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
