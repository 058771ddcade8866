//! Push notification feed
//!
//! The feed transport delivers notifications on its own worker thread. They
//! cross into the async scheduler through a bounded `mpsc` channel, which is
//! the only cross-thread handoff in the pipeline.

mod pubsub;

pub use pubsub::PubSubFeed;

use anyhow::Result;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::models::PushNotification;

/// Source of at-least-once push notifications
pub trait PushFeed: Send + Sync {
    /// Start delivering notifications into `sender`
    ///
    /// Delivery continues until the returned subscription is stopped or the
    /// receiving half of the channel is dropped.
    fn subscribe(&self, sender: mpsc::Sender<PushNotification>) -> Result<FeedSubscription>;
}

/// Handle to a running feed subscription
///
/// Stopped on drop.
pub struct FeedSubscription {
    name: String,
    stopped: Arc<AtomicBool>,
}

impl FeedSubscription {
    /// Wrap a stop flag shared with the feed worker
    pub fn new(name: impl Into<String>, stopped: Arc<AtomicBool>) -> Self {
        Self {
            name: name.into(),
            stopped,
        }
    }

    /// Cancel the subscription; later calls are no-ops
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!("Stopped feed subscription {}", self.name);
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_is_idempotent() {
        let flag = Arc::new(AtomicBool::new(false));
        let subscription = FeedSubscription::new("test", flag.clone());

        subscription.stop();
        subscription.stop();
        assert!(subscription.is_stopped());
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_drop_stops() {
        let flag = Arc::new(AtomicBool::new(false));
        drop(FeedSubscription::new("test", flag.clone()));
        assert!(flag.load(Ordering::SeqCst));
    }
}
