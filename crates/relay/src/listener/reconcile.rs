//! Cursor reconciliation and per-message processing

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::content::{BODY_PREVIEW_MAX, SNIPPET_MAX, detect_code, truncate};
use crate::delivery::{DeliverySink, Notice};
use crate::gmail::{HistoryExpiredError, MailService, extract_body_text, extract_header};
use crate::models::{MessageEvent, MessageId, PushNotification, ThreadId};
use crate::storage::WatchStore;

/// What happened to one push notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No watch record to diff against; notification dropped
    NoBaseline,
    /// `history_id` was at or behind the cursor; notification dropped
    Stale { cursor: u64 },
    /// Store or history lookup failed; cursor untouched
    Failed,
    /// Stored cursor had expired remotely and was moved to the notification
    Rebased { cursor: u64 },
    /// History expanded and dispatched
    Processed(BatchStats),
}

/// Statistics from one expanded batch
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchStats {
    /// Distinct messages found in the history gap
    pub expanded: usize,
    /// Messages delivered to the sink
    pub delivered: usize,
    /// Messages already in the ledger
    pub skipped: usize,
    /// Messages that failed to fetch, log or deliver
    pub failed: usize,
    /// Cursor after the batch
    pub cursor: u64,
}

/// What happened to one message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Delivered,
    /// Already logged by an earlier notification
    AlreadyLogged,
    /// Logged, but the sink rejected it; stays un-notified
    DeliveryFailed,
}

/// Reconciles push notifications against the stored history cursor
pub struct NotificationListener {
    mail: MailService,
    store: Arc<dyn WatchStore>,
    sink: Arc<dyn DeliverySink>,
    /// History label filter, normally `INBOX`
    label: Option<String>,
    /// One reconciliation in flight at a time
    reconcile_lock: Mutex<()>,
}

impl NotificationListener {
    pub fn new(
        mail: MailService,
        store: Arc<dyn WatchStore>,
        sink: Arc<dyn DeliverySink>,
        label: Option<String>,
    ) -> Self {
        Self {
            mail,
            store,
            sink,
            label,
            reconcile_lock: Mutex::new(()),
        }
    }

    /// Reconcile one notification
    ///
    /// Never fails; every problem is logged and reported in the outcome.
    pub async fn reconcile(&self, notification: &PushNotification) -> ReconcileOutcome {
        let _guard = self.reconcile_lock.lock().await;
        let history_id = notification.history_id;

        // 1. Read the baseline fresh
        let record = match self.store.get_watch_record() {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(
                    "No watch record, dropping notification (historyId {})",
                    history_id
                );
                return ReconcileOutcome::NoBaseline;
            }
            Err(e) => {
                error!("Failed to read watch record: {:#}", e);
                return ReconcileOutcome::Failed;
            }
        };
        let cursor = record.history_cursor;

        // 2. Drop replays and reordered notifications
        if history_id <= cursor {
            debug!(
                "Stale notification (historyId {} <= cursor {})",
                history_id, cursor
            );
            return ReconcileOutcome::Stale { cursor };
        }

        // 3. Expand the gap
        let slice = match self.mail.history_since(cursor, self.label.as_deref()).await {
            Ok(slice) => slice,
            Err(e) if e.downcast_ref::<HistoryExpiredError>().is_some() => {
                error!(
                    "History cursor {} expired, changes up to {} are lost; rebasing",
                    cursor, history_id
                );
                return match self.store.advance_cursor(history_id) {
                    Ok(_) => ReconcileOutcome::Rebased { cursor: history_id },
                    Err(e) => {
                        error!("Failed to rebase cursor: {:#}", e);
                        ReconcileOutcome::Failed
                    }
                };
            }
            Err(e) => {
                error!("Failed to expand history after {}: {:#}", cursor, e);
                return ReconcileOutcome::Failed;
            }
        };

        let mut seen = HashSet::new();
        let mut highest = None;
        let mut to_process = Vec::new();
        for added in slice.added {
            if added.history_id <= cursor || added.history_id > history_id {
                continue;
            }
            highest = highest.max(Some(added.history_id));
            if seen.insert(added.message_id.clone()) {
                to_process.push(added.message_id);
            }
        }

        // 4. Dispatch, isolating failures per message
        let mut stats = BatchStats {
            expanded: to_process.len(),
            cursor,
            ..Default::default()
        };
        for message_id in &to_process {
            match self.process(message_id, false).await {
                Ok(ProcessOutcome::Delivered) => stats.delivered += 1,
                Ok(ProcessOutcome::AlreadyLogged) => stats.skipped += 1,
                Ok(ProcessOutcome::DeliveryFailed) => stats.failed += 1,
                Err(e) => {
                    error!("Failed to process message {}: {:#}", message_id, e);
                    stats.failed += 1;
                }
            }
        }

        // 5. Advance the cursor as far as the server has made visible
        let target = if slice.head.is_some_and(|head| head >= history_id) {
            Some(history_id)
        } else {
            highest
        };
        if let Some(target) = target {
            match self.store.advance_cursor(target) {
                Ok(_) => stats.cursor = cursor.max(target),
                Err(e) => error!("Failed to advance cursor to {}: {:#}", target, e),
            }
        }

        if stats.expanded > 0 {
            info!(
                "Notification {}: {} new, {} delivered, {} skipped, {} failed, cursor {}",
                history_id, stats.expanded, stats.delivered, stats.skipped, stats.failed, stats.cursor
            );
        }
        ReconcileOutcome::Processed(stats)
    }

    /// Fetch, log and deliver one message unless it is already in the ledger
    pub async fn process_message(&self, message_id: &MessageId) -> Result<ProcessOutcome> {
        self.process(message_id, false).await
    }

    /// Fetch, log and deliver one message, even if it was handled before
    pub async fn reprocess(&self, message_id: &MessageId) -> Result<ProcessOutcome> {
        info!("Reprocessing message {}", message_id);
        self.process(message_id, true).await
    }

    async fn process(&self, message_id: &MessageId, force: bool) -> Result<ProcessOutcome> {
        if !force && self.store.get_event(message_id)?.is_some() {
            debug!("Message {} already logged, skipping", message_id);
            return Ok(ProcessOutcome::AlreadyLogged);
        }

        let (metadata, full) = tokio::join!(
            self.mail.get_message_metadata(message_id),
            self.mail.get_message(message_id)
        );
        let metadata = metadata.context("Failed to fetch message metadata")?;
        let body = match full {
            Ok(message) => message
                .payload
                .as_ref()
                .map(extract_body_text)
                .unwrap_or_default(),
            Err(e) => {
                warn!("Failed to fetch body of {}, using empty body: {:#}", message_id, e);
                String::new()
            }
        };

        let headers = metadata.payload.as_ref();
        let from_email = headers
            .and_then(|p| extract_header(p, "From"))
            .unwrap_or_else(|| "Unknown".to_string());
        let subject = headers
            .and_then(|p| extract_header(p, "Subject"))
            .unwrap_or_else(|| "(no subject)".to_string());
        let code = detect_code(&body);

        let event = MessageEvent::builder(message_id.clone(), ThreadId::new(&metadata.thread_id))
            .from_email(from_email)
            .subject(subject)
            .snippet(truncate(&metadata.snippet, SNIPPET_MAX))
            .body_preview(truncate(&body, BODY_PREVIEW_MAX))
            .code(code.clone())
            .build();
        self.store.log_event(&event).context("Failed to log message event")?;

        let notice = Notice::new(event, code);
        if let Err(e) = self.sink.deliver(&notice).await {
            error!("Failed to deliver message {}: {:#}", message_id, e);
            return Ok(ProcessOutcome::DeliveryFailed);
        }

        self.store
            .mark_notified(message_id)
            .context("Failed to mark message notified")?;
        info!("Delivered message {} ({})", message_id, notice.event.subject);
        Ok(ProcessOutcome::Delivered)
    }
}
