//! End-to-end tests for the conversation core against in-memory stores.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use choff_conversation::{
    Conversation, ConversationError, EventBus, StateMap, Summarize, SummaryStatus,
};
use choff_events::{Event, EventBody, EventStore};
use choff_messages::MessageStore;

// A single connection keeps every query on the same in-memory database.
async fn conversation() -> (Conversation, Arc<EventBus>, EventStore) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let messages_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    choff_messages::migrate(&messages_pool).await.unwrap();

    let events_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    choff_events::migrate(&events_pool).await.unwrap();

    let bus = Arc::new(EventBus::new());
    let events = EventStore::new(events_pool);
    let conversation = Conversation::new(
        "conv-1",
        MessageStore::new(messages_pool),
        events.clone(),
        bus.clone(),
    );
    (conversation, bus, events)
}

fn collect(bus: &EventBus) -> Arc<Mutex<Vec<Event>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(
        "collector",
        Arc::new(move |event: &Event| {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        }),
    );
    seen
}

struct JoiningSummarizer {
    calls: AtomicUsize,
}

impl JoiningSummarizer {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Summarize for JoiningSummarizer {
    async fn summarize(&self, messages: Vec<String>) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("summary of: {}", messages.join(" / ")))
    }
}

struct FailingSummarizer;

#[async_trait]
impl Summarize for FailingSummarizer {
    async fn summarize(&self, _messages: Vec<String>) -> anyhow::Result<String> {
        anyhow::bail!("model unavailable")
    }
}

struct SlowSummarizer;

#[async_trait]
impl Summarize for SlowSummarizer {
    async fn summarize(&self, messages: Vec<String>) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(format!("{} messages, eventually", messages.len()))
    }
}

#[tokio::test]
async fn add_message_writes_store_event_and_bus() {
    let (conversation, bus, events) = conversation().await;
    let seen = collect(&bus);

    let id = conversation.add_message("hello there", "user").await.unwrap();

    let stored = conversation.get_messages(None, None, None).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, id);
    assert_eq!(stored[0].content, "hello there");
    assert_eq!(stored[0].role, "user");

    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(
        log[0].metadata.correlation_id.as_deref(),
        Some(id.to_string().as_str())
    );
    match &log[0].body {
        EventBody::Message { content, source } => {
            assert_eq!(content, "hello there");
            assert_eq!(source.as_deref(), Some("user"));
        }
        other => panic!("expected a message event, got {other:?}"),
    }

    assert_eq!(seen.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn messages_capture_the_state_at_add_time() {
    let (conversation, _bus, _events) = conversation().await;

    let mut state = StateMap::new();
    state.insert("analytical".to_string(), 0.8);
    state.insert("curious".to_string(), 0.5);
    conversation.update_choff_state(state, "manual").await.unwrap();

    conversation.add_message("tagged", "user").await.unwrap();

    let stored = conversation.get_messages(None, None, None).await.unwrap();
    assert_eq!(
        stored[0].choff_tags,
        vec!["analytical:0.8".to_string(), "curious:0.5".to_string()]
    );

    // Later state changes must not rewrite history.
    conversation
        .update_choff_state(StateMap::new(), "reset")
        .await
        .unwrap();
    let after = conversation.get_messages(None, None, None).await.unwrap();
    assert_eq!(after[0].choff_tags.len(), 2);
}

#[tokio::test]
async fn empty_content_is_rejected_before_any_write() {
    let (conversation, bus, events) = conversation().await;
    let seen = collect(&bus);

    conversation.add_message("", "user").await.unwrap_err();

    // Neither store saw the rejected message, and nothing was published.
    assert!(conversation.get_messages(None, None, None).await.unwrap().is_empty());
    assert!(events.get_by_conversation("conv-1", None).await.unwrap().is_empty());
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn out_of_range_state_is_rejected_before_mutation() {
    let (conversation, bus, events) = conversation().await;
    let seen = collect(&bus);

    let mut state = StateMap::new();
    state.insert("analytical".to_string(), 2.0);
    conversation.update_choff_state(state, "shift").await.unwrap_err();

    // Current state and transition history are untouched.
    assert!(conversation.choff_state().is_empty());
    assert!(conversation.transitions().is_empty());
    assert!(events.get_by_conversation("conv-1", None).await.unwrap().is_empty());
    assert!(seen.lock().unwrap().is_empty());

    let mut state = StateMap::new();
    state.insert(String::new(), 0.5);
    conversation.update_choff_state(state, "shift").await.unwrap_err();
    assert!(conversation.transitions().is_empty());
}

#[tokio::test]
async fn delete_message_records_the_removed_content() {
    let (conversation, _bus, events) = conversation().await;

    let id = conversation.add_message("ephemeral", "user").await.unwrap();
    assert!(conversation.delete_message(id).await.unwrap());
    assert!(conversation.get_messages(None, None, None).await.unwrap().is_empty());

    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    assert_eq!(log.len(), 2);
    match &log[1].body {
        EventBody::Message { content, source } => {
            assert_eq!(content, "ephemeral");
            assert_eq!(source.as_deref(), Some("delete"));
        }
        other => panic!("expected a message event, got {other:?}"),
    }

    // A second delete finds nothing and appends nothing.
    assert!(!conversation.delete_message(id).await.unwrap());
    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    assert_eq!(log.len(), 2);
}

#[tokio::test]
async fn get_messages_filters_by_role_and_window() {
    let (conversation, _bus, _events) = conversation().await;

    conversation.add_message("question", "user").await.unwrap();
    conversation.add_message("answer", "assistant").await.unwrap();
    conversation.add_message("followup", "user").await.unwrap();

    let users = conversation.get_messages(None, None, Some("USER")).await.unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|m| m.role == "user"));

    let future = Utc::now() + chrono::Duration::hours(1);
    assert!(conversation
        .get_messages(Some(future), None, None)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        conversation
            .get_messages(None, Some(future), None)
            .await
            .unwrap()
            .len(),
        3
    );
}

#[tokio::test]
async fn transitions_chain_previous_to_new() {
    let (conversation, _bus, events) = conversation().await;

    let mut first = StateMap::new();
    first.insert("curious".to_string(), 0.9);
    conversation.update_choff_state(first.clone(), "manual").await.unwrap();

    let mut second = StateMap::new();
    second.insert("analytical".to_string(), 0.7);
    conversation.update_choff_state(second.clone(), "shift").await.unwrap();

    assert_eq!(conversation.choff_state(), second);

    let transitions = conversation.transitions();
    assert_eq!(transitions.len(), 2);
    assert!(transitions[0].previous.is_empty());
    assert_eq!(transitions[0].new, first);
    assert_eq!(transitions[1].previous, first);
    assert_eq!(transitions[1].new, second);
    assert_eq!(transitions[1].transition_type, "shift");

    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|e| e.body.kind() == "state"));
}

#[tokio::test]
async fn request_summary_needs_a_summarizer() {
    let (conversation, _bus, _events) = conversation().await;
    conversation.add_message("hi", "user").await.unwrap();

    let err = conversation.request_summary(None, None, None).await.unwrap_err();
    assert!(matches!(err, ConversationError::SummarizerUnavailable));
}

#[tokio::test]
async fn request_summary_needs_messages() {
    let (conversation, _bus, _events) = conversation().await;
    let conversation = conversation.with_summarizer(JoiningSummarizer::new());

    let err = conversation.request_summary(None, None, None).await.unwrap_err();
    assert!(matches!(err, ConversationError::NoMessagesToSummarize));

    // Ids that resolve to nothing are just as empty.
    let err = conversation
        .request_summary(Some(vec![41, 42]), None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::NoMessagesToSummarize));
}

#[tokio::test]
async fn summary_completes_once_and_caches() {
    let (conversation, _bus, events) = conversation().await;
    let summarizer = JoiningSummarizer::new();
    let conversation = conversation.with_summarizer(summarizer.clone());

    conversation.add_message("first point", "user").await.unwrap();
    conversation.add_message("second point", "assistant").await.unwrap();

    let summary_id = conversation.request_summary(None, None, None).await.unwrap();

    let summary = conversation.get_summary(summary_id, None).await.unwrap();
    assert_eq!(summary.status, SummaryStatus::Completed);
    assert_eq!(
        summary.content.as_deref(),
        Some("summary of: first point / second point")
    );
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

    // A second fetch returns the finished summary without another call.
    let again = conversation.get_summary(summary_id, None).await.unwrap();
    assert_eq!(again.status, SummaryStatus::Completed);
    assert_eq!(summarizer.calls.load(Ordering::SeqCst), 1);

    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    let summarizer_events: Vec<_> = log
        .iter()
        .filter(|e| {
            matches!(
                &e.body,
                EventBody::Message { source, .. } if source.as_deref() == Some("summarizer")
            )
        })
        .collect();
    // One for the request, one for the completion, both linked to the summary.
    assert_eq!(summarizer_events.len(), 2);
    assert!(summarizer_events
        .iter()
        .all(|e| e.metadata.correlation_id.as_deref() == Some(summary_id.to_string().as_str())));
}

#[tokio::test]
async fn summarizer_failure_is_recorded_and_sticky() {
    let (conversation, _bus, events) = conversation().await;
    let conversation = conversation.with_summarizer(Arc::new(FailingSummarizer));

    conversation.add_message("doomed", "user").await.unwrap();
    let summary_id = conversation.request_summary(None, None, None).await.unwrap();

    let summary = conversation.get_summary(summary_id, None).await.unwrap();
    assert_eq!(summary.status, SummaryStatus::Failed);
    assert!(summary.error.as_deref().unwrap().contains("model unavailable"));
    assert!(summary.content.is_none());

    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    let failure = log
        .iter()
        .find(|e| e.body.kind() == "error")
        .expect("an error event should be appended");
    match &failure.body {
        EventBody::Error { error_type, message, .. } => {
            assert_eq!(error_type, "SummarizationFailed");
            assert!(message.contains("model unavailable"));
        }
        other => panic!("expected an error event, got {other:?}"),
    }

    // Terminal status is returned as-is on later fetches.
    let again = conversation.get_summary(summary_id, None).await.unwrap();
    assert_eq!(again.status, SummaryStatus::Failed);
}

#[tokio::test]
async fn unknown_summary_id_is_an_error() {
    let (conversation, _bus, _events) = conversation().await;
    let conversation = conversation.with_summarizer(JoiningSummarizer::new());

    let missing = Uuid::new_v4();
    let err = conversation.get_summary(missing, None).await.unwrap_err();
    assert!(matches!(err, ConversationError::SummaryNotFound(id) if id == missing));
}

// Runs in real time: tokio's paused clock auto-advances past the sqlx pool's
// acquire timeout whenever an acquire has to wait, aborting the test in setup.
#[tokio::test]
async fn summary_timeout_leaves_it_pending_and_retryable() {
    let (conversation, _bus, events) = conversation().await;
    let conversation = conversation.with_summarizer(Arc::new(SlowSummarizer));

    conversation.add_message("slow going", "user").await.unwrap();
    let summary_id = conversation.request_summary(None, None, None).await.unwrap();
    let baseline = events.get_by_conversation("conv-1", None).await.unwrap().len();

    let err = conversation
        .get_summary(summary_id, Some(Duration::from_secs(1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ConversationError::Timeout(_)));

    // Nothing recorded for the aborted attempt.
    let log = events.get_by_conversation("conv-1", None).await.unwrap();
    assert_eq!(log.len(), baseline);

    // A retry with a generous deadline still completes.
    let summary = conversation
        .get_summary(summary_id, Some(Duration::from_secs(120)))
        .await
        .unwrap();
    assert_eq!(summary.status, SummaryStatus::Completed);
    assert_eq!(summary.content.as_deref(), Some("1 messages, eventually"));
}

#[tokio::test]
async fn explicit_ids_override_the_time_range() {
    let (conversation, _bus, _events) = conversation().await;
    let summarizer = JoiningSummarizer::new();
    let conversation = conversation.with_summarizer(summarizer);

    let keep = conversation.add_message("keep me", "user").await.unwrap();
    conversation.add_message("ignore me", "user").await.unwrap();

    let summary_id = conversation
        .request_summary(Some(vec![keep]), None, None)
        .await
        .unwrap();
    let summary = conversation.get_summary(summary_id, None).await.unwrap();
    assert_eq!(summary.content.as_deref(), Some("summary of: keep me"));
}
