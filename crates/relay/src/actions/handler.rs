//! Action handler for operator requests
//!
//! Coordinates between the Gmail API and the event ledger.

use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use crate::gmail::MailService;
use crate::models::{MessageEvent, MessageId};
use crate::storage::WatchStore;

/// Longest reply text accepted, in characters
pub const REPLY_MAX: usize = 2000;

/// Handler for the actions offered on a notice
///
/// Mutations go to Gmail first; the ledger is only updated once the server
/// accepted the change.
pub struct ActionHandler {
    mail: MailService,
    store: Arc<dyn WatchStore>,
}

impl ActionHandler {
    /// Create a new action handler
    pub fn new(mail: MailService, store: Arc<dyn WatchStore>) -> Self {
        Self { mail, store }
    }

    fn logged_event(&self, message_id: &MessageId) -> Result<MessageEvent> {
        self.store
            .get_event(message_id)?
            .with_context(|| format!("No logged event for message {}", message_id))
    }

    /// Reply in the thread of a logged message
    pub async fn reply(&self, message_id: &MessageId, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            anyhow::bail!("Reply text is empty");
        }
        let len = text.chars().count();
        if len > REPLY_MAX {
            anyhow::bail!("Reply text is {} characters, limit is {}", len, REPLY_MAX);
        }

        let event = self.logged_event(message_id)?;
        self.mail
            .send_reply(&event.thread_id, message_id, text)
            .await?;

        info!("Sent reply to message {}", message_id);
        Ok(())
    }

    /// Permanently delete a message and flag it in the ledger
    pub async fn delete(&self, message_id: &MessageId) -> Result<()> {
        self.mail.delete_message(message_id).await?;
        self.store.mark_deleted(message_id)?;

        info!("Deleted message {}", message_id);
        Ok(())
    }

    /// Verification code detected when the message was logged
    pub fn copy_code(&self, message_id: &MessageId) -> Result<Option<String>> {
        Ok(self.logged_event(message_id)?.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreadId;
    use crate::pool::BlockingPool;
    use crate::storage::InMemoryWatchStore;
    use crate::test_utils::FakeMailClient;

    fn setup() -> (Arc<FakeMailClient>, Arc<InMemoryWatchStore>, ActionHandler) {
        let fake = Arc::new(FakeMailClient::new());
        let store = Arc::new(InMemoryWatchStore::new());
        let handler = ActionHandler::new(
            MailService::new(fake.clone(), BlockingPool::new(2)),
            store.clone(),
        );

        let event = MessageEvent::builder(MessageId::new("m1"), ThreadId::new("t1"))
            .subject("Sign in")
            .body_preview("Use 482910 to sign in")
            .code(Some("482910".to_string()))
            .build();
        store.log_event(&event).unwrap();

        (fake, store, handler)
    }

    #[tokio::test]
    async fn test_reply_uses_logged_thread() {
        let (fake, _store, handler) = setup();
        handler.reply(&MessageId::new("m1"), "Thanks").await.unwrap();

        let replies = fake.replies.lock().unwrap();
        assert_eq!(
            replies.as_slice(),
            &[("t1".to_string(), "m1".to_string(), "Thanks".to_string())]
        );
    }

    #[tokio::test]
    async fn test_reply_limits() {
        let (fake, _store, handler) = setup();
        let id = MessageId::new("m1");

        assert!(handler.reply(&id, "   ").await.is_err());
        assert!(handler.reply(&id, &"a".repeat(REPLY_MAX + 1)).await.is_err());
        assert!(handler.reply(&id, &"a".repeat(REPLY_MAX)).await.is_ok());
        assert!(handler.reply(&MessageId::new("unknown"), "hi").await.is_err());
        assert_eq!(fake.replies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_marks_ledger() {
        let (fake, store, handler) = setup();
        handler.delete(&MessageId::new("m1")).await.unwrap();

        assert_eq!(fake.deleted.lock().unwrap().as_slice(), &["m1".to_string()]);
        assert!(store.get_event(&MessageId::new("m1")).unwrap().unwrap().deleted);
    }

    #[test]
    fn test_copy_code() {
        let (_fake, _store, handler) = setup();
        assert_eq!(
            handler.copy_code(&MessageId::new("m1")).unwrap(),
            Some("482910".to_string())
        );
        assert!(handler.copy_code(&MessageId::new("missing")).is_err());
    }

    #[test]
    fn test_copy_code_ignores_preview_text() {
        let (_fake, store, handler) = setup();
        // Preview shows a cut-off prefix of the real code
        let event = MessageEvent::builder(MessageId::new("m2"), ThreadId::new("t2"))
            .body_preview("Your code is 482910")
            .code(Some("48291077".to_string()))
            .build();
        store.log_event(&event).unwrap();

        assert_eq!(
            handler.copy_code(&MessageId::new("m2")).unwrap(),
            Some("48291077".to_string())
        );
    }
}
