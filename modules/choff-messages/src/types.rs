use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Speaker::User => "user",
            Speaker::Assistant => "assistant",
        }
    }

    /// Map a free-form role string onto a speaker. Anything that is not
    /// "user" (case-insensitive) speaks as the assistant.
    pub fn from_role(role: &str) -> Self {
        if role.eq_ignore_ascii_case("user") {
            Speaker::User
        } else {
            Speaker::Assistant
        }
    }
}

/// A chat message with its CHOFF tags.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub speaker: Speaker,
    pub content: String,
    /// Raw tag strings in declaration order. Duplicates permitted.
    pub choff_tags: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(
        speaker: Speaker,
        content: impl Into<String>,
        choff_tags: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            speaker,
            content: content.into(),
            choff_tags,
            timestamp,
        }
    }
}
