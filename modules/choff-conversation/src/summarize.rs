//! Collaborator boundary for summary generation.
//!
//! The core hands over an ordered sequence of message contents and gets a
//! single summary string back. How that string is produced is entirely the
//! collaborator's business.

use async_trait::async_trait;

#[async_trait]
pub trait Summarize: Send + Sync {
    async fn summarize(&self, messages: Vec<String>) -> anyhow::Result<String>;
}
