//! Async facade over a blocking [`MailClient`]

use anyhow::Result;
use std::sync::Arc;

use super::api::GmailMessage;
use super::{HistorySlice, MailClient, WatchGrant};
use crate::models::{MessageId, ThreadId};
use crate::pool::BlockingPool;

/// Mail operations callable from the async scheduler
///
/// Every call is routed through the shared [`BlockingPool`].
#[derive(Clone)]
pub struct MailService {
    client: Arc<dyn MailClient>,
    pool: BlockingPool,
}

impl MailService {
    pub fn new(client: Arc<dyn MailClient>, pool: BlockingPool) -> Self {
        Self { client, pool }
    }

    pub async fn watch(&self, topic: &str, label_ids: &[String]) -> Result<WatchGrant> {
        let client = self.client.clone();
        let topic = topic.to_string();
        let label_ids = label_ids.to_vec();
        self.pool.run(move || client.watch(&topic, &label_ids)).await
    }

    pub async fn stop_watch(&self) -> Result<()> {
        let client = self.client.clone();
        self.pool.run(move || client.stop_watch()).await
    }

    pub async fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        let client = self.client.clone();
        let id = id.clone();
        self.pool.run(move || client.get_message(&id)).await
    }

    pub async fn get_message_metadata(&self, id: &MessageId) -> Result<GmailMessage> {
        let client = self.client.clone();
        let id = id.clone();
        self.pool.run(move || client.get_message_metadata(&id)).await
    }

    pub async fn history_since(&self, cursor: u64, label_id: Option<&str>) -> Result<HistorySlice> {
        let client = self.client.clone();
        let label_id = label_id.map(str::to_string);
        self.pool
            .run(move || client.history_since(cursor, label_id.as_deref()))
            .await
    }

    pub async fn delete_message(&self, id: &MessageId) -> Result<()> {
        let client = self.client.clone();
        let id = id.clone();
        self.pool.run(move || client.delete_message(&id)).await
    }

    pub async fn send_reply(
        &self,
        thread_id: &ThreadId,
        in_reply_to: &MessageId,
        text: &str,
    ) -> Result<()> {
        let client = self.client.clone();
        let thread_id = thread_id.clone();
        let in_reply_to = in_reply_to.clone();
        let text = text.to_string();
        self.pool
            .run(move || client.send_reply(&thread_id, &in_reply_to, &text))
            .await
    }
}
