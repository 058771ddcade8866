//! Delivery of new-message notices to the operator
//!
//! The pipeline hands each surfaced message to a [`DeliverySink`] together
//! with the actions the operator can take on it.

mod discord;

pub use discord::DiscordDmSink;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::MessageEvent;

/// An action offered alongside a delivered notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryAction {
    /// Reply in the message's thread
    Reply,
    /// Permanently delete the message
    Delete,
    /// Copy the detected verification code
    CopyCode(String),
    /// Open the thread in the Gmail web UI
    OpenThread(String),
}

/// A new-message event ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub event: MessageEvent,
    /// Verification code found in the body, if any
    pub code: Option<String>,
    pub actions: Vec<DeliveryAction>,
}

impl Notice {
    /// Build a notice offering every action that applies to `event`
    pub fn new(event: MessageEvent, code: Option<String>) -> Self {
        let mut actions = vec![DeliveryAction::Reply, DeliveryAction::Delete];
        if let Some(code) = &code {
            actions.push(DeliveryAction::CopyCode(code.clone()));
        }
        actions.push(DeliveryAction::OpenThread(event.thread_url()));

        Self {
            event,
            code,
            actions,
        }
    }
}

/// Destination for operator notices
///
/// `deliver` resolves once the notice was accepted; an error means the
/// operator did not get it.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, notice: &Notice) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, ThreadId};

    fn event() -> MessageEvent {
        MessageEvent::builder(MessageId::new("m1"), ThreadId::new("t1")).build()
    }

    #[test]
    fn test_actions_without_code() {
        let notice = Notice::new(event(), None);
        assert_eq!(
            notice.actions,
            vec![
                DeliveryAction::Reply,
                DeliveryAction::Delete,
                DeliveryAction::OpenThread("https://mail.google.com/mail/u/0/#inbox/t1".to_string()),
            ]
        );
    }

    #[test]
    fn test_copy_action_when_code_present() {
        let notice = Notice::new(event(), Some("482910".to_string()));
        assert!(
            notice
                .actions
                .contains(&DeliveryAction::CopyCode("482910".to_string()))
        );
    }
}
