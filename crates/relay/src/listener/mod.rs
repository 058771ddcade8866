//! Notification listener
//!
//! Turns coarse "something changed" push notifications into individual
//! new-message notices:
//! - Reconcile each notification against the stored history cursor
//! - Expand the history gap into added messages
//! - Fetch, log and deliver each message once
//! - Advance the cursor

mod content;
mod lifecycle;
mod reconcile;

pub use content::{BODY_PREVIEW_MAX, SNIPPET_MAX, detect_code, truncate};
pub use lifecycle::ListenerHandle;
pub use reconcile::{BatchStats, NotificationListener, ProcessOutcome, ReconcileOutcome};
