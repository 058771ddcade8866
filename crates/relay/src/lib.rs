//! Relay crate - Gmail change notifications to operator notices
//!
//! This crate provides the notification pipeline:
//! - Domain models (WatchRecord, MessageEvent, PushNotification)
//! - Gmail API client and stored OAuth token handling
//! - Watch lifecycle (establish, periodic renewal, teardown)
//! - Push feed subscription and cursor reconciliation
//! - Delivery sinks and operator action handlers
//! - Storage trait abstractions

pub mod actions;
pub mod config;
pub mod delivery;
pub mod feed;
pub mod gmail;
pub mod listener;
pub mod models;
pub mod pool;
pub mod storage;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_utils;

pub use actions::{ActionHandler, ActionKind, ActionRequest};
pub use config::{GmailCredentials, RelaySettings, SettingsError};
pub use delivery::{DeliveryAction, DeliverySink, DiscordDmSink, Notice};
pub use feed::{FeedSubscription, PubSubFeed, PushFeed};
pub use gmail::{GmailClient, GoogleAuth, HistoryExpiredError, MailClient, MailService};
pub use listener::{
    BatchStats, ListenerHandle, NotificationListener, ProcessOutcome, ReconcileOutcome,
};
pub use models::{MessageEvent, MessageId, PushNotification, ThreadId, WatchRecord};
pub use pool::BlockingPool;
pub use storage::{InMemoryWatchStore, SqliteWatchStore, WatchStore};
pub use watch::{RenewalDecision, WatchManager};
