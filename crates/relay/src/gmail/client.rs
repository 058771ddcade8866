//! Gmail API HTTP client
//!
//! Provides the remote operations the notification pipeline needs.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use std::sync::Arc;

use super::api::{
    GmailMessage, HistoryResponse, SendRequest, WatchRequest, WatchResponse,
};
use super::{AddedMessage, GoogleAuth, HistorySlice, MailClient, WatchGrant, compose_reply, extract_header};
use crate::models::{MessageId, ThreadId};

/// Error indicating the history ID has expired
#[derive(Debug, thiserror::Error)]
#[error("History ID expired or invalid")]
pub struct HistoryExpiredError;

/// Gmail API client
pub struct GmailClient {
    auth: Arc<GoogleAuth>,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Create a new Gmail client
    pub fn new(auth: Arc<GoogleAuth>) -> Self {
        Self { auth }
    }

    fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.auth.get_access_token()?))
    }

    /// Fetch a message in the given format
    fn fetch_message(&self, id: &MessageId, format: &str, extra: &str) -> Result<GmailMessage> {
        let url = format!(
            "{}/users/me/messages/{}?format={}{}",
            Self::BASE_URL,
            id.as_str(),
            format,
            extra
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .with_context(|| format!("Failed to send get message request for {}", id))?;

        let message: GmailMessage = response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")?;

        Ok(message)
    }

    /// List one page of history since a given historyId
    ///
    /// # Errors
    /// Returns `HistoryExpiredError` if the history ID is too old (404 from Gmail)
    pub fn list_history(
        &self,
        start_history_id: u64,
        label_id: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<HistoryResponse> {
        let mut url = format!(
            "{}/users/me/history?startHistoryId={}&historyTypes=messageAdded",
            Self::BASE_URL,
            start_history_id
        );

        if let Some(label) = label_id {
            url.push_str(&format!("&labelId={}", urlencoding::encode(label)));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let response = ureq::get(&url)
            .header("Authorization", &self.bearer()?)
            .call();

        match response {
            Ok(mut resp) => {
                let history: HistoryResponse = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse history response")?;
                Ok(history)
            }
            Err(ureq::Error::StatusCode(404)) => Err(HistoryExpiredError.into()),
            Err(e) => Err(anyhow::anyhow!("Failed to fetch history: {}", e)),
        }
    }
}

impl MailClient for GmailClient {
    fn watch(&self, topic: &str, label_ids: &[String]) -> Result<WatchGrant> {
        let url = format!("{}/users/me/watch", Self::BASE_URL);
        let request = WatchRequest {
            topic_name: topic,
            label_ids,
        };

        let mut response = ureq::post(&url)
            .header("Authorization", &self.bearer()?)
            .send_json(&request)
            .context("Failed to send watch request")?;

        let watch: WatchResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse watch response")?;

        Ok(WatchGrant {
            expiration_ms: watch
                .expiration
                .parse()
                .context("Watch expiration is not a number")?,
            history_baseline: watch
                .history_id
                .parse()
                .context("Watch historyId is not a number")?,
        })
    }

    fn stop_watch(&self) -> Result<()> {
        let url = format!("{}/users/me/stop", Self::BASE_URL);
        ureq::post(&url)
            .header("Authorization", &self.bearer()?)
            .send_empty()
            .context("Failed to send stop request")?;
        Ok(())
    }

    fn get_message(&self, id: &MessageId) -> Result<GmailMessage> {
        self.fetch_message(id, "full", "")
    }

    fn get_message_metadata(&self, id: &MessageId) -> Result<GmailMessage> {
        self.fetch_message(
            id,
            "metadata",
            "&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Message-ID",
        )
    }

    fn history_since(&self, cursor: u64, label_id: Option<&str>) -> Result<HistorySlice> {
        let mut slice = HistorySlice::default();
        let mut page_token = None;

        loop {
            let response = self.list_history(cursor, label_id, page_token.as_deref())?;

            for record in response.history.unwrap_or_default() {
                let history_id: u64 = record
                    .id
                    .parse()
                    .with_context(|| format!("Invalid history record id {}", record.id))?;
                for added in record.messages_added.unwrap_or_default() {
                    slice.added.push(AddedMessage {
                        history_id,
                        message_id: MessageId::new(added.message.id),
                        thread_id: ThreadId::new(added.message.thread_id),
                    });
                }
            }

            if let Some(head) = response.history_id.as_deref() {
                slice.head = head.parse().ok().or(slice.head);
            }

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(slice)
    }

    fn delete_message(&self, id: &MessageId) -> Result<()> {
        let url = format!("{}/users/me/messages/{}", Self::BASE_URL, id.as_str());
        ureq::delete(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .with_context(|| format!("Failed to delete message {}", id))?;
        Ok(())
    }

    fn send_reply(&self, thread_id: &ThreadId, in_reply_to: &MessageId, text: &str) -> Result<()> {
        let original = self.get_message_metadata(in_reply_to)?;
        let payload = original
            .payload
            .as_ref()
            .context("Original message has no payload")?;

        let to = extract_header(payload, "From").context("Original message has no From header")?;
        let subject = extract_header(payload, "Subject").unwrap_or_default();
        let rfc_message_id = extract_header(payload, "Message-ID");

        let raw = compose_reply(&to, &subject, rfc_message_id.as_deref(), text);
        let url = format!("{}/users/me/messages/send", Self::BASE_URL);
        let request = SendRequest {
            raw: &raw,
            thread_id: thread_id.as_str(),
        };

        ureq::post(&url)
            .header("Authorization", &self.bearer()?)
            .send_json(&request)
            .context("Failed to send reply")?;
        Ok(())
    }
}
