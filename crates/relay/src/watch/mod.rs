//! Watch lifecycle
//!
//! Keeps the server-side Gmail watch alive and persists its history baseline.

mod manager;
mod timing;

pub use manager::{RenewalDecision, WatchManager};
pub use timing::{RENEWAL_THRESHOLD, renewal_due};
