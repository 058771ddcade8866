//! Gmail API integration
//!
//! This module provides:
//! - Stored OAuth token handling
//! - The `MailClient` seam and its blocking Gmail implementation
//! - Response normalization (headers, plain text body)
//! - Reply composition
//! - `MailService`, the async facade used by the pipeline

mod auth;
mod client;
mod compose;
mod normalize;
mod service;

pub use auth::GoogleAuth;
pub use client::{GmailClient, HistoryExpiredError};
pub use compose::compose_reply;
pub use normalize::{extract_body_text, extract_header};
pub use service::MailService;

use anyhow::Result;

use crate::models::{MessageId, ThreadId};

/// A message added to the mailbox, as reported by the history API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedMessage {
    /// Id of the history record that reported the addition
    pub history_id: u64,
    pub message_id: MessageId,
    pub thread_id: ThreadId,
}

/// Flattened result of paging through the history API
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistorySlice {
    /// Mailbox head historyId at the time of the listing
    pub head: Option<u64>,
    /// Additions in change-log order
    pub added: Vec<AddedMessage>,
}

/// Result of establishing a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchGrant {
    /// Epoch milliseconds at which the watch lapses
    pub expiration_ms: i64,
    /// Mailbox historyId the watch starts from
    pub history_baseline: u64,
}

/// Remote mail operations the pipeline depends on
///
/// Implementations are blocking; [`MailService`] moves every call onto the
/// bounded worker pool so the async scheduler never stalls.
pub trait MailClient: Send + Sync {
    /// Start (or renew) a change watch publishing to `topic`
    fn watch(&self, topic: &str, label_ids: &[String]) -> Result<WatchGrant>;

    /// Stop the change watch
    fn stop_watch(&self) -> Result<()>;

    /// Fetch the full message
    fn get_message(&self, id: &MessageId) -> Result<api::GmailMessage>;

    /// Fetch headers and snippet only
    fn get_message_metadata(&self, id: &MessageId) -> Result<api::GmailMessage>;

    /// List messages added after `cursor`, restricted to `label_id`
    ///
    /// # Errors
    /// Returns [`HistoryExpiredError`] if the cursor is too old.
    fn history_since(&self, cursor: u64, label_id: Option<&str>) -> Result<HistorySlice>;

    /// Permanently delete a message
    fn delete_message(&self, id: &MessageId) -> Result<()>;

    /// Send a plain text reply in the message's thread
    fn send_reply(&self, thread_id: &ThreadId, in_reply_to: &MessageId, text: &str) -> Result<()>;
}

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Full or metadata-only message from Gmail API
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: String,
        pub label_ids: Option<Vec<String>>,
        #[serde(default)]
        pub snippet: String,
        pub internal_date: Option<String>,
        pub payload: Option<MessagePayload>,
    }

    /// Message payload containing headers and body
    ///
    /// Nested parts share the same shape, so one type covers both.
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePayload>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Clone, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Message body (base64url encoded)
    #[derive(Debug, Clone, Default, Deserialize)]
    pub struct MessageBody {
        pub size: Option<u32>,
        pub data: Option<String>,
    }

    /// Response from `users.history.list`
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryResponse {
        pub history: Option<Vec<HistoryRecord>>,
        pub history_id: Option<String>,
        pub next_page_token: Option<String>,
    }

    /// One change-log entry
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct HistoryRecord {
        pub id: String,
        pub messages_added: Option<Vec<HistoryMessageAdded>>,
    }

    /// A message-added change
    #[derive(Debug, Deserialize)]
    pub struct HistoryMessageAdded {
        pub message: MessageRef,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: String,
    }

    /// Request body for `users.watch`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchRequest<'a> {
        pub topic_name: &'a str,
        pub label_ids: &'a [String],
    }

    /// Response from `users.watch`
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct WatchResponse {
        pub history_id: String,
        pub expiration: String,
    }

    /// Request body for `users.messages.send`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct SendRequest<'a> {
        pub raw: &'a str,
        pub thread_id: &'a str,
    }
}
