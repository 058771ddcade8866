//! Storage trait definitions

use crate::models::{MessageEvent, MessageId, WatchRecord};
use anyhow::Result;

/// Durable state shared by the watch manager and the notification listener
///
/// Implementations must keep these guarantees regardless of caller order:
/// - at most one watch record exists
/// - `history_cursor` never decreases, through either replacement or advance
/// - logging an event again never resets its `notified`/`deleted` flags
pub trait WatchStore: Send + Sync {
    /// Get the current watch record, if a watch was ever established
    fn get_watch_record(&self) -> Result<Option<WatchRecord>>;

    /// Atomically replace the watch record
    ///
    /// Sets the expiration, resets `created_at` to now and clears
    /// `renewed_at`. The stored cursor becomes the larger of the current and
    /// the given value. Returns the record as stored.
    fn replace_watch_record(&self, expiration_ms: i64, history_cursor: u64) -> Result<WatchRecord>;

    /// Move the cursor forward to `history_cursor`
    ///
    /// Returns `true` if the cursor moved; `false` if there is no record or
    /// the stored cursor is already at or past the given value.
    fn advance_cursor(&self, history_cursor: u64) -> Result<bool>;

    /// Stamp the watch record as renewed now
    fn touch_renewed(&self) -> Result<()>;

    /// Mark the watch as expired after it was stopped remotely
    ///
    /// The cursor is kept so a later watch resumes from it.
    fn expire_watch(&self) -> Result<()>;

    /// Insert an event, or refresh its content if it was logged before
    fn log_event(&self, event: &MessageEvent) -> Result<()>;

    /// Get a logged event by message id
    fn get_event(&self, id: &MessageId) -> Result<Option<MessageEvent>>;

    /// Mark an event as delivered; `notified_at` is kept from the first call
    fn mark_notified(&self, id: &MessageId) -> Result<()>;

    /// Mark an event as deleted by the operator
    fn mark_deleted(&self, id: &MessageId) -> Result<()>;

    /// Events never delivered, oldest first
    fn list_unnotified(&self, limit: usize) -> Result<Vec<MessageEvent>>;
}
