//! In-memory storage implementation
//!
//! Used by tests and dry runs. Semantics match the SQLite store.

use anyhow::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::WatchStore;
use crate::models::{MessageEvent, MessageId, WatchRecord};

/// In-memory implementation of WatchStore
///
/// Uses RwLocks for thread-safe access.
pub struct InMemoryWatchStore {
    watch: RwLock<Option<WatchRecord>>,
    events: RwLock<HashMap<String, MessageEvent>>,
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow::anyhow!("Store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow::anyhow!("Store lock poisoned"))
}

impl InMemoryWatchStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self {
            watch: RwLock::new(None),
            events: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryWatchStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchStore for InMemoryWatchStore {
    fn get_watch_record(&self) -> Result<Option<WatchRecord>> {
        Ok(read(&self.watch)?.clone())
    }

    fn replace_watch_record(&self, expiration_ms: i64, history_cursor: u64) -> Result<WatchRecord> {
        let mut watch = write(&self.watch)?;
        let cursor = watch
            .as_ref()
            .map_or(history_cursor, |w| w.history_cursor.max(history_cursor));
        let record = WatchRecord::new(expiration_ms, cursor);
        *watch = Some(record.clone());
        Ok(record)
    }

    fn advance_cursor(&self, history_cursor: u64) -> Result<bool> {
        let mut watch = write(&self.watch)?;
        match watch.as_mut() {
            Some(record) if record.history_cursor < history_cursor => {
                record.history_cursor = history_cursor;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn touch_renewed(&self) -> Result<()> {
        if let Some(record) = write(&self.watch)?.as_mut() {
            record.renewed_at = Some(Utc::now());
        }
        Ok(())
    }

    fn expire_watch(&self) -> Result<()> {
        if let Some(record) = write(&self.watch)?.as_mut() {
            record.expiration_ms = 0;
        }
        Ok(())
    }

    fn log_event(&self, event: &MessageEvent) -> Result<()> {
        let mut events = write(&self.events)?;
        match events.get_mut(event.message_id.as_str()) {
            Some(existing) => {
                existing.thread_id = event.thread_id.clone();
                existing.from_email = event.from_email.clone();
                existing.subject = event.subject.clone();
                existing.snippet = event.snippet.clone();
                existing.body_preview = event.body_preview.clone();
                existing.has_code = event.has_code;
                existing.code = event.code.clone();
            }
            None => {
                let mut fresh = event.clone();
                fresh.notified = false;
                fresh.deleted = false;
                fresh.notified_at = None;
                events.insert(event.message_id.0.clone(), fresh);
            }
        }
        Ok(())
    }

    fn get_event(&self, id: &MessageId) -> Result<Option<MessageEvent>> {
        Ok(read(&self.events)?.get(id.as_str()).cloned())
    }

    fn mark_notified(&self, id: &MessageId) -> Result<()> {
        if let Some(event) = write(&self.events)?.get_mut(id.as_str()) {
            event.notified = true;
            event.notified_at.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    fn mark_deleted(&self, id: &MessageId) -> Result<()> {
        if let Some(event) = write(&self.events)?.get_mut(id.as_str()) {
            event.deleted = true;
        }
        Ok(())
    }

    fn list_unnotified(&self, limit: usize) -> Result<Vec<MessageEvent>> {
        let events = read(&self.events)?;
        let mut pending: Vec<_> = events.values().filter(|e| !e.notified).cloned().collect();
        pending.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        pending.truncate(limit);
        Ok(pending)
    }
}
