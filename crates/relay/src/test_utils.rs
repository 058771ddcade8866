//! Test doubles shared by the unit tests

use anyhow::Result;
use async_trait::async_trait;
use base64::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::delivery::{DeliverySink, Notice};
use crate::gmail::api::{GmailMessage, Header, MessageBody, MessagePayload};
use crate::gmail::{AddedMessage, HistoryExpiredError, HistorySlice, MailClient, WatchGrant};
use crate::models::{MessageId, ThreadId};

/// How `history_since` should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryFailure {
    Expired,
    Unavailable,
}

/// Scriptable in-process mailbox
#[derive(Default)]
pub struct FakeMailClient {
    pub grant: Mutex<Option<WatchGrant>>,
    pub fail_watch: AtomicBool,
    pub watch_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,

    pub history: Mutex<Vec<AddedMessage>>,
    pub head: Mutex<Option<u64>>,
    pub history_failure: Mutex<Option<HistoryFailure>>,
    pub history_calls: AtomicUsize,

    pub messages: Mutex<HashMap<String, GmailMessage>>,
    pub fail_metadata: Mutex<HashSet<String>>,
    pub fail_full: Mutex<HashSet<String>>,
    pub metadata_calls: AtomicUsize,

    pub deleted: Mutex<Vec<String>>,
    pub replies: Mutex<Vec<(String, String, String)>>,
}

impl FakeMailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_grant(expiration_ms: i64, history_baseline: u64) -> Self {
        let fake = Self::new();
        *fake.grant.lock().unwrap() = Some(WatchGrant {
            expiration_ms,
            history_baseline,
        });
        fake
    }

    /// Add a message to the mailbox and report it at `history_id`
    pub fn add_message(&self, history_id: u64, id: &str, thread: &str, subject: &str, body: &str) {
        self.messages
            .lock()
            .unwrap()
            .insert(id.to_string(), make_message(id, thread, subject, body));
        self.history.lock().unwrap().push(AddedMessage {
            history_id,
            message_id: MessageId::new(id),
            thread_id: ThreadId::new(thread),
        });
        let mut head = self.head.lock().unwrap();
        *head = Some(head.unwrap_or(0).max(history_id));
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

pub fn make_message(id: &str, thread: &str, subject: &str, body: &str) -> GmailMessage {
    let header = |name: &str, value: &str| Header {
        name: name.to_string(),
        value: value.to_string(),
    };

    GmailMessage {
        id: id.to_string(),
        thread_id: thread.to_string(),
        label_ids: Some(vec!["INBOX".to_string()]),
        snippet: body.chars().take(100).collect(),
        internal_date: Some("1700000000000".to_string()),
        payload: Some(MessagePayload {
            mime_type: Some("text/plain".to_string()),
            headers: Some(vec![
                header("From", "Sender <sender@example.com>"),
                header("Subject", subject),
                header("Message-ID", &format!("<{}@mail.example.com>", id)),
            ]),
            body: Some(MessageBody {
                size: Some(body.len() as u32),
                data: Some(BASE64_URL_SAFE_NO_PAD.encode(body)),
            }),
            ..Default::default()
        }),
    }
}

impl MailClient for FakeMailClient {
    fn watch(&self, _topic: &str, _label_ids: &[String]) -> Result<WatchGrant> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_watch.load(Ordering::SeqCst) {
            anyhow::bail!("watch rejected");
        }
        match *self.grant.lock().unwrap() {
            Some(grant) => Ok(grant),
            None => anyhow::bail!("no grant scripted"),
        }
    }

    fn stop_watch(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        if self.fail_full.lock().unwrap().contains(id.as_str()) {
            anyhow::bail!("full fetch failed for {}", id);
        }
        self.messages
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such message {}", id))
    }

    fn get_message_metadata(&self, id: &MessageId) -> Result<GmailMessage> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_metadata.lock().unwrap().contains(id.as_str()) {
            anyhow::bail!("metadata fetch failed for {}", id);
        }
        let mut message = self
            .messages
            .lock()
            .unwrap()
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such message {}", id))?;
        if let Some(payload) = message.payload.as_mut() {
            payload.body = None;
        }
        Ok(message)
    }

    fn history_since(&self, cursor: u64, _label_id: Option<&str>) -> Result<HistorySlice> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        match *self.history_failure.lock().unwrap() {
            Some(HistoryFailure::Expired) => return Err(HistoryExpiredError.into()),
            Some(HistoryFailure::Unavailable) => anyhow::bail!("history unavailable"),
            None => {}
        }
        let added = self
            .history
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.history_id > cursor)
            .cloned()
            .collect();
        Ok(HistorySlice {
            head: *self.head.lock().unwrap(),
            added,
        })
    }

    fn delete_message(&self, id: &MessageId) -> Result<()> {
        self.deleted.lock().unwrap().push(id.as_str().to_string());
        Ok(())
    }

    fn send_reply(&self, thread_id: &ThreadId, in_reply_to: &MessageId, text: &str) -> Result<()> {
        self.replies.lock().unwrap().push((
            thread_id.as_str().to_string(),
            in_reply_to.as_str().to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

/// Sink that records every notice it accepts
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<Notice>>,
    pub fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.event.message_id.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("sink offline");
        }
        self.delivered.lock().unwrap().push(notice.clone());
        Ok(())
    }
}
