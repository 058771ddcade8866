//! Persisted state of the server-side change watch

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// The single active Gmail watch
///
/// Exactly one logical record exists at a time. `history_cursor` marks the
/// last fully processed position in the mailbox change log and never moves
/// backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchRecord {
    /// Instant (epoch milliseconds) after which the subscription lapses
    pub expiration_ms: i64,
    /// Last fully processed Gmail historyId
    pub history_cursor: u64,
    /// When the watch was established
    pub created_at: DateTime<Utc>,
    /// When the watch was last renewed
    pub renewed_at: Option<DateTime<Utc>>,
}

impl WatchRecord {
    /// Create a freshly established watch record
    pub fn new(expiration_ms: i64, history_cursor: u64) -> Self {
        Self {
            expiration_ms,
            history_cursor,
            created_at: Utc::now(),
            renewed_at: None,
        }
    }

    /// Expiration as a timestamp, if representable
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expiration_ms).single()
    }

    /// Lifetime left before expiration, negative once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> chrono::Duration {
        chrono::Duration::milliseconds(self.expiration_ms - now.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record() {
        let record = WatchRecord::new(1_700_000_000_000, 42);
        assert_eq!(record.history_cursor, 42);
        assert!(record.renewed_at.is_none());
        assert_eq!(
            record.expires_at().map(|t| t.timestamp_millis()),
            Some(1_700_000_000_000)
        );
    }

    #[test]
    fn test_remaining() {
        let now = Utc::now();
        let expiration = now + chrono::Duration::hours(30);
        let record = WatchRecord::new(expiration.timestamp_millis(), 1);
        assert_eq!(record.remaining(now).num_hours(), 30);

        let expired = WatchRecord::new((now - chrono::Duration::hours(1)).timestamp_millis(), 1);
        assert!(expired.remaining(now) < chrono::Duration::zero());
    }
}
