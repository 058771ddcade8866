//! Discord direct-message delivery
//!
//! Posts notices to the operator's DM channel through the Discord REST API.
//! Uses synchronous HTTP (ureq) on the blocking pool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::OnceLock;

use super::{DeliveryAction, DeliverySink, Notice};
use crate::actions::{ActionKind, ActionRequest};
use crate::listener::truncate;
use crate::pool::BlockingPool;

/// Discord caps message content at 2000 characters
const CONTENT_MAX: usize = 2000;

/// Button styles from the Discord components API
mod style {
    pub const PRIMARY: u8 = 1;
    pub const SECONDARY: u8 = 2;
    pub const DANGER: u8 = 4;
    pub const LINK: u8 = 5;
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

/// Delivers notices as DMs from a bot account to one operator
pub struct DiscordDmSink {
    token: String,
    recipient_id: u64,
    pool: BlockingPool,
    /// DM channel id, resolved on first delivery
    channel_id: OnceLock<String>,
}

impl DiscordDmSink {
    const BASE_URL: &'static str = "https://discord.com/api/v10";

    pub fn new(token: impl Into<String>, recipient_id: u64, pool: BlockingPool) -> Self {
        Self {
            token: token.into(),
            recipient_id,
            pool,
            channel_id: OnceLock::new(),
        }
    }

    async fn dm_channel(&self) -> Result<String> {
        if let Some(id) = self.channel_id.get() {
            return Ok(id.clone());
        }

        let token = self.token.clone();
        let recipient_id = self.recipient_id;
        let id = self
            .pool
            .run(move || open_dm_channel(&token, recipient_id))
            .await?;

        // A concurrent delivery may have won the race; both ids are the same channel
        let _ = self.channel_id.set(id.clone());
        Ok(id)
    }
}

#[async_trait]
impl DeliverySink for DiscordDmSink {
    async fn deliver(&self, notice: &Notice) -> Result<()> {
        let channel_id = self.dm_channel().await?;
        let body = message_body(notice);
        let token = self.token.clone();

        self.pool
            .run(move || post_message(&token, &channel_id, &body))
            .await
            .with_context(|| {
                format!(
                    "Failed to deliver notice for {}",
                    notice.event.message_id
                )
            })
    }
}

fn open_dm_channel(token: &str, recipient_id: u64) -> Result<String> {
    let url = format!("{}/users/@me/channels", DiscordDmSink::BASE_URL);
    let mut response = ureq::post(&url)
        .header("Authorization", &format!("Bot {}", token))
        .send_json(json!({ "recipient_id": recipient_id.to_string() }))
        .context("Failed to open DM channel")?;

    let channel: Channel = response
        .body_mut()
        .read_json()
        .context("Failed to parse DM channel response")?;
    Ok(channel.id)
}

fn post_message(token: &str, channel_id: &str, body: &Value) -> Result<()> {
    let url = format!("{}/channels/{}/messages", DiscordDmSink::BASE_URL, channel_id);
    ureq::post(&url)
        .header("Authorization", &format!("Bot {}", token))
        .send_json(body)
        .context("Failed to post DM")?;
    Ok(())
}

/// Plain text content for a notice
fn render_content(notice: &Notice) -> String {
    let event = &notice.event;
    let mut content = format!(
        "📧 **New Email**\n**From:** {}\n**Subject:** {}\n\n{}",
        event.from_email, event.subject, event.snippet
    );
    if !event.body_preview.is_empty() {
        content.push_str("\n\n");
        content.push_str(&event.body_preview);
    }
    if notice.code.is_some() {
        content.push_str("\n\n_This message may contain a verification code._");
    }
    truncate(&content, CONTENT_MAX)
}

fn button(action: &DeliveryAction, notice: &Notice) -> Value {
    let id = &notice.event.message_id;
    let interactive = |kind: ActionKind, label: &str, style: u8| {
        json!({
            "type": 2,
            "style": style,
            "label": label,
            "custom_id": ActionRequest::new(kind, id.clone()).custom_id(),
        })
    };

    match action {
        DeliveryAction::Reply => interactive(ActionKind::Reply, "Reply", style::PRIMARY),
        DeliveryAction::Delete => interactive(ActionKind::Delete, "Delete", style::DANGER),
        DeliveryAction::CopyCode(_) => interactive(ActionKind::CopyCode, "Copy Code", style::SECONDARY),
        DeliveryAction::OpenThread(url) => json!({
            "type": 2,
            "style": style::LINK,
            "label": "Read All",
            "url": url,
        }),
    }
}

/// Full message payload: content plus one action row of buttons
fn message_body(notice: &Notice) -> Value {
    let buttons: Vec<Value> = notice
        .actions
        .iter()
        .take(5)
        .map(|action| button(action, notice))
        .collect();

    json!({
        "content": render_content(notice),
        "components": [{ "type": 1, "components": buttons }],
        "allowed_mentions": { "parse": [] },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageEvent, MessageId, ThreadId};

    fn notice(code: Option<&str>) -> Notice {
        let event = MessageEvent::builder(MessageId::new("18c"), ThreadId::new("18b"))
            .from_email("Bank <no-reply@bank.example>")
            .subject("Sign-in code")
            .snippet("Your code is 482910")
            .body_preview("Your code is 482910. It expires in 10 minutes.")
            .has_code(code.is_some())
            .build();
        Notice::new(event, code.map(str::to_string))
    }

    #[test]
    fn test_content_mentions_code() {
        let content = render_content(&notice(Some("482910")));
        assert!(content.contains("**From:** Bank <no-reply@bank.example>"));
        assert!(content.contains("verification code"));
        assert!(!render_content(&notice(None)).contains("verification code"));
    }

    #[test]
    fn test_content_capped() {
        let mut n = notice(None);
        n.event.body_preview = "x".repeat(5000);
        assert_eq!(render_content(&n).chars().count(), CONTENT_MAX);
    }

    #[test]
    fn test_buttons_carry_custom_ids() {
        let body = message_body(&notice(Some("482910")));
        let buttons = body["components"][0]["components"].as_array().unwrap();

        assert_eq!(buttons.len(), 4);
        assert_eq!(buttons[0]["custom_id"], "gmail_reply:18c");
        assert_eq!(buttons[1]["custom_id"], "gmail_delete:18c");
        assert_eq!(buttons[2]["custom_id"], "gmail_copy:18c");
        assert_eq!(buttons[3]["url"], "https://mail.google.com/mail/u/0/#inbox/18b");
        assert!(buttons[3].get("custom_id").is_none());
    }
}
