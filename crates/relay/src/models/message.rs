//! Message identifiers and the per-message notification ledger entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a thread (Gmail thread ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One remote message surfaced to the operator
///
/// This is the durable dedup/audit ledger: a row is written before delivery
/// and flipped to `notified` only after the sink accepted it. `deleted` is
/// set independently by the delete action and never reverts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    /// Gmail message ID
    pub message_id: MessageId,
    /// Thread the message belongs to
    pub thread_id: ThreadId,
    /// Raw `From` header
    pub from_email: String,
    /// Subject line
    pub subject: String,
    /// Gmail snippet, at most 500 characters
    pub snippet: String,
    /// Plain text body preview, at most 1000 characters
    pub body_preview: String,
    /// Whether the body looked like it carried a verification code
    pub has_code: bool,
    /// Verification code detected in the full body
    #[serde(default)]
    pub code: Option<String>,
    /// Whether the operator has been notified
    pub notified: bool,
    /// Whether the operator deleted the message
    pub deleted: bool,
    /// When the event was first logged
    pub received_at: DateTime<Utc>,
    /// When delivery succeeded
    pub notified_at: Option<DateTime<Utc>>,
}

impl MessageEvent {
    /// Create a new event builder
    pub fn builder(message_id: MessageId, thread_id: ThreadId) -> MessageEventBuilder {
        MessageEventBuilder::new(message_id, thread_id)
    }

    /// Link to the thread in the Gmail web UI
    pub fn thread_url(&self) -> String {
        format!(
            "https://mail.google.com/mail/u/0/#inbox/{}",
            self.thread_id.as_str()
        )
    }
}

/// Builder for creating MessageEvent instances
pub struct MessageEventBuilder {
    message_id: MessageId,
    thread_id: ThreadId,
    from_email: String,
    subject: String,
    snippet: String,
    body_preview: String,
    has_code: bool,
    code: Option<String>,
    received_at: Option<DateTime<Utc>>,
}

impl MessageEventBuilder {
    fn new(message_id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            message_id,
            thread_id,
            from_email: String::new(),
            subject: String::new(),
            snippet: String::new(),
            body_preview: String::new(),
            has_code: false,
            code: None,
            received_at: None,
        }
    }

    pub fn from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = from_email.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }

    pub fn body_preview(mut self, body_preview: impl Into<String>) -> Self {
        self.body_preview = body_preview.into();
        self
    }

    pub fn has_code(mut self, has_code: bool) -> Self {
        self.has_code = has_code;
        self
    }

    /// Record the detected code; also sets `has_code`
    pub fn code(mut self, code: Option<String>) -> Self {
        self.has_code = code.is_some();
        self.code = code;
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn build(self) -> MessageEvent {
        MessageEvent {
            message_id: self.message_id,
            thread_id: self.thread_id,
            from_email: self.from_email,
            subject: self.subject,
            snippet: self.snippet,
            body_preview: self.body_preview,
            has_code: self.has_code,
            code: self.code,
            notified: false,
            deleted: false,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            notified_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_starts_unnotified() {
        let event = MessageEvent::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .from_email("Alice <alice@example.com>")
            .subject("Hello")
            .has_code(true)
            .build();

        assert_eq!(event.message_id.as_str(), "m1");
        assert!(event.has_code);
        assert!(!event.notified);
        assert!(!event.deleted);
        assert!(event.notified_at.is_none());
    }

    #[test]
    fn test_code_sets_has_code() {
        let event = MessageEvent::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .code(Some("482910".to_string()))
            .build();
        assert!(event.has_code);
        assert_eq!(event.code.as_deref(), Some("482910"));

        let plain = MessageEvent::builder(MessageId::new("m2"), ThreadId::new("t2"))
            .code(None)
            .build();
        assert!(!plain.has_code);
    }

    #[test]
    fn test_thread_url() {
        let event = MessageEvent::builder(MessageId::new("m1"), ThreadId::new("18c2f")).build();
        assert_eq!(
            event.thread_url(),
            "https://mail.google.com/mail/u/0/#inbox/18c2f"
        );
    }
}
