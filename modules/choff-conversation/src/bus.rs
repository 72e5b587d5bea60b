//! Synchronous in-memory publish/subscribe.
//!
//! Dispatch runs on the publishing caller's context; handlers must not
//! block indefinitely. The lock covers only snapshot and mutation of the
//! subscriber list, never dispatch, so handlers may subscribe or
//! unsubscribe without affecting the publish already in flight.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use choff_events::Event;

/// A subscriber callback. Errors are captured per handler and logged;
/// they never propagate to the publisher or to other handlers.
pub type EventHandler = Arc<dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<Vec<(String, EventHandler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a key. Subscribing an already-registered
    /// key is a no-op.
    pub fn subscribe(&self, key: impl Into<String>, handler: EventHandler) {
        let key = key.into();
        let mut handlers = self.lock();
        if handlers.iter().any(|(k, _)| *k == key) {
            return;
        }
        handlers.push((key, handler));
    }

    /// Remove a handler by key. Idempotent.
    pub fn unsubscribe(&self, key: &str) {
        self.lock().retain(|(k, _)| k != key);
    }

    /// Invoke every currently-subscribed handler with the event. The
    /// subscriber list is snapshotted before dispatch; a handler failure is
    /// logged and the remaining handlers still run.
    pub fn publish(&self, event: &Event) {
        let snapshot: Vec<(String, EventHandler)> = self.lock().clone();
        for (key, handler) in snapshot {
            if let Err(error) = handler(event) {
                warn!(handler = key.as_str(), %error, "event handler failed");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, EventHandler)>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
