//! SQLite-based watch and notification storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use rusqlite_migration::{M, Migrations};

use super::traits::WatchStore;
use crate::models::{MessageEvent, MessageId, ThreadId, WatchRecord};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- The one active Gmail watch; the CHECK pins it to a single row
            CREATE TABLE watch_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                expiration_ms INTEGER NOT NULL,
                history_cursor INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                renewed_at TEXT
            );

            -- Notification ledger, one row per surfaced message
            CREATE TABLE message_events (
                message_id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL,
                from_email TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT NOT NULL,
                body_preview TEXT NOT NULL,
                has_code INTEGER NOT NULL DEFAULT 0,
                notified INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                received_at TEXT NOT NULL,
                notified_at TEXT
            );
            "#,
        ),
        // Migration 2: Index for the un-notified backlog
        M::up(
            r#"
            CREATE INDEX idx_message_events_pending
                ON message_events(notified, received_at ASC);
            "#,
        ),
        // Migration 3: Detected verification code
        M::up("ALTER TABLE message_events ADD COLUMN code TEXT;"),
    ])
}

const EVENT_COLUMNS: &str = "message_id, thread_id, from_email, subject, snippet, body_preview,
     has_code, notified, deleted, received_at, notified_at, code";

/// SQLite-based watch store
pub struct SqliteWatchStore {
    conn: Mutex<Connection>,
}

impl SqliteWatchStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;

        // WAL keeps readers unblocked while the listener writes; NORMAL sync
        // is durable enough under WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;

        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Database lock poisoned"))
    }
}

fn cursor_to_sql(cursor: u64) -> Result<i64> {
    i64::try_from(cursor).context("History cursor does not fit in a database integer")
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn read_watch_record(conn: &Connection) -> Result<Option<WatchRecord>> {
    let row: Option<(i64, i64, String, Option<String>)> = conn
        .query_row(
            "SELECT expiration_ms, history_cursor, created_at, renewed_at
             FROM watch_state WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;

    let Some((expiration_ms, cursor, created_at, renewed_at)) = row else {
        return Ok(None);
    };

    Ok(Some(WatchRecord {
        expiration_ms,
        history_cursor: u64::try_from(cursor).context("Stored history cursor is negative")?,
        created_at: parse_timestamp(&created_at),
        renewed_at: renewed_at.as_deref().map(parse_timestamp),
    }))
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<MessageEvent> {
    let received_at: String = row.get(9)?;
    let notified_at: Option<String> = row.get(10)?;

    Ok(MessageEvent {
        message_id: MessageId::new(row.get::<_, String>(0)?),
        thread_id: ThreadId::new(row.get::<_, String>(1)?),
        from_email: row.get(2)?,
        subject: row.get(3)?,
        snippet: row.get(4)?,
        body_preview: row.get(5)?,
        has_code: row.get(6)?,
        notified: row.get(7)?,
        deleted: row.get(8)?,
        received_at: parse_timestamp(&received_at),
        notified_at: notified_at.as_deref().map(parse_timestamp),
        code: row.get(11)?,
    })
}

impl WatchStore for SqliteWatchStore {
    fn get_watch_record(&self) -> Result<Option<WatchRecord>> {
        let conn = self.conn()?;
        read_watch_record(&conn)
    }

    fn replace_watch_record(&self, expiration_ms: i64, history_cursor: u64) -> Result<WatchRecord> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO watch_state (id, expiration_ms, history_cursor, created_at, renewed_at)
             VALUES (1, ?1, ?2, ?3, NULL)
             ON CONFLICT(id) DO UPDATE SET
                expiration_ms = excluded.expiration_ms,
                history_cursor = MAX(watch_state.history_cursor, excluded.history_cursor),
                created_at = excluded.created_at,
                renewed_at = NULL",
            params![
                expiration_ms,
                cursor_to_sql(history_cursor)?,
                Utc::now().to_rfc3339()
            ],
        )?;

        let record = read_watch_record(&tx)?.context("Watch record missing after replace")?;
        tx.commit()?;
        Ok(record)
    }

    fn advance_cursor(&self, history_cursor: u64) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE watch_state SET history_cursor = ?1
             WHERE id = 1 AND history_cursor < ?1",
            [cursor_to_sql(history_cursor)?],
        )?;
        Ok(changed > 0)
    }

    fn touch_renewed(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE watch_state SET renewed_at = ?1 WHERE id = 1",
            [Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn expire_watch(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("UPDATE watch_state SET expiration_ms = 0 WHERE id = 1", [])?;
        Ok(())
    }

    fn log_event(&self, event: &MessageEvent) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO message_events
                (message_id, thread_id, from_email, subject, snippet, body_preview,
                 has_code, code, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(message_id) DO UPDATE SET
                thread_id = excluded.thread_id,
                from_email = excluded.from_email,
                subject = excluded.subject,
                snippet = excluded.snippet,
                body_preview = excluded.body_preview,
                has_code = excluded.has_code,
                code = excluded.code",
            params![
                event.message_id.as_str(),
                event.thread_id.as_str(),
                event.from_email,
                event.subject,
                event.snippet,
                event.body_preview,
                event.has_code,
                event.code,
                event.received_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_event(&self, id: &MessageId) -> Result<Option<MessageEvent>> {
        let conn = self.conn()?;
        let event = conn
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM message_events WHERE message_id = ?"),
                [id.as_str()],
                event_from_row,
            )
            .optional()?;
        Ok(event)
    }

    fn mark_notified(&self, id: &MessageId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE message_events
             SET notified = 1, notified_at = COALESCE(notified_at, ?2)
             WHERE message_id = ?1",
            params![id.as_str(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn mark_deleted(&self, id: &MessageId) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE message_events SET deleted = 1 WHERE message_id = ?",
            [id.as_str()],
        )?;
        Ok(())
    }

    fn list_unnotified(&self, limit: usize) -> Result<Vec<MessageEvent>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM message_events
             WHERE notified = 0
             ORDER BY received_at ASC
             LIMIT ?"
        ))?;

        let events = stmt
            .query_map([limit as i64], event_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_event(id: &str) -> MessageEvent {
        MessageEvent::builder(MessageId::new(id), ThreadId::new(format!("t-{id}")))
            .from_email("Sender <sender@example.com>")
            .subject(format!("Subject {id}"))
            .snippet("snippet")
            .body_preview("body")
            .build()
    }

    #[test]
    fn test_migrations_are_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_no_record_initially() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        assert!(store.get_watch_record().unwrap().is_none());
        assert!(!store.advance_cursor(10).unwrap());
    }

    #[test]
    fn test_replace_keeps_single_row() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.replace_watch_record(1_000, 100).unwrap();
        let record = store.replace_watch_record(2_000, 150).unwrap();

        assert_eq!(record.expiration_ms, 2_000);
        assert_eq!(record.history_cursor, 150);

        let count: i64 = store
            .conn()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM watch_state", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_replace_never_lowers_cursor() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.replace_watch_record(1_000, 500).unwrap();
        let record = store.replace_watch_record(9_000, 400).unwrap();

        assert_eq!(record.expiration_ms, 9_000);
        assert_eq!(record.history_cursor, 500);
    }

    #[test]
    fn test_advance_cursor_is_monotonic() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.replace_watch_record(1_000, 100).unwrap();

        assert!(store.advance_cursor(120).unwrap());
        assert!(!store.advance_cursor(110).unwrap());
        assert!(!store.advance_cursor(120).unwrap());
        assert_eq!(store.get_watch_record().unwrap().unwrap().history_cursor, 120);
    }

    #[test]
    fn test_touch_renewed() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.replace_watch_record(1_000, 1).unwrap();
        store.touch_renewed().unwrap();
        assert!(store.get_watch_record().unwrap().unwrap().renewed_at.is_some());
    }

    #[test]
    fn test_expire_keeps_cursor() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        store.expire_watch().unwrap();
        assert!(store.get_watch_record().unwrap().is_none());

        store.replace_watch_record(i64::MAX, 88).unwrap();
        store.expire_watch().unwrap();
        let record = store.get_watch_record().unwrap().unwrap();
        assert_eq!(record.expiration_ms, 0);
        assert_eq!(record.history_cursor, 88);
    }

    #[test]
    fn test_event_flags_survive_relog() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        let event = make_event("m1");
        store.log_event(&event).unwrap();
        store.mark_notified(&event.message_id).unwrap();
        store.mark_deleted(&event.message_id).unwrap();

        let first = store.get_event(&event.message_id).unwrap().unwrap();
        assert!(first.notified);
        assert!(first.deleted);
        let notified_at = first.notified_at;
        assert!(notified_at.is_some());

        let mut updated = make_event("m1");
        updated.subject = "Changed".to_string();
        store.log_event(&updated).unwrap();
        store.mark_notified(&event.message_id).unwrap();

        let second = store.get_event(&event.message_id).unwrap().unwrap();
        assert_eq!(second.subject, "Changed");
        assert!(second.notified);
        assert!(second.deleted);
        assert_eq!(second.notified_at, notified_at);
    }

    #[test]
    fn test_code_round_trips() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        let mut event = make_event("m1");
        event.has_code = true;
        event.code = Some("482910".to_string());
        store.log_event(&event).unwrap();
        store.log_event(&make_event("m2")).unwrap();

        let stored = store.get_event(&MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(stored.code.as_deref(), Some("482910"));
        assert!(store.get_event(&MessageId::new("m2")).unwrap().unwrap().code.is_none());
    }

    #[test]
    fn test_list_unnotified() {
        let store = SqliteWatchStore::open_in_memory().unwrap();
        for id in ["m1", "m2", "m3"] {
            store.log_event(&make_event(id)).unwrap();
        }
        store.mark_notified(&MessageId::new("m2")).unwrap();

        let pending = store.list_unnotified(10).unwrap();
        let ids: Vec<_> = pending.iter().map(|e| e.message_id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"m1"));
        assert!(ids.contains(&"m3"));

        assert_eq!(store.list_unnotified(1).unwrap().len(), 1);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("herald.db");

        {
            let store = SqliteWatchStore::open(&path).unwrap();
            store.replace_watch_record(5_000, 77).unwrap();
            store.log_event(&make_event("m1")).unwrap();
        }

        let store = SqliteWatchStore::open(&path).unwrap();
        let record = store.get_watch_record().unwrap().unwrap();
        assert_eq!(record.history_cursor, 77);
        assert!(store.get_event(&MessageId::new("m1")).unwrap().is_some());
    }
}
