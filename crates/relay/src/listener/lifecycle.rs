//! Listener start/stop

use anyhow::Result;
use log::{error, info};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::NotificationListener;
use crate::feed::{FeedSubscription, PushFeed};

impl NotificationListener {
    /// Subscribe to `feed` and reconcile notifications as they arrive
    ///
    /// The feed delivers on its own thread; notifications are queued on a
    /// channel of `capacity` and reconciled one at a time on the calling
    /// runtime. Must be called from within a tokio runtime.
    pub fn start(self: Arc<Self>, feed: &dyn PushFeed, capacity: usize) -> Result<ListenerHandle> {
        let (sender, mut receiver) = mpsc::channel(capacity.max(1));
        let subscription = feed.subscribe(sender)?;
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    next = receiver.recv() => match next {
                        Some(notification) => {
                            self.reconcile(&notification).await;
                        }
                        None => break,
                    },
                }
            }
            // Queued but unreconciled notifications are dropped here; they
            // were acked, but the next notification re-covers the gap
            receiver.close();
            info!("Notification listener stopped");
        });

        info!("Notification listener started");
        Ok(ListenerHandle {
            subscription,
            stop_tx,
            task: Mutex::new(Some(task)),
        })
    }
}

/// Running listener
pub struct ListenerHandle {
    subscription: FeedSubscription,
    stop_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ListenerHandle {
    /// Cancel the feed subscription and stop accepting notifications
    ///
    /// A reconciliation already in progress runs to completion. Calling
    /// `stop` again has no effect.
    pub fn stop(&self) {
        self.subscription.stop();
        self.stop_tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Stop and wait for the in-flight reconciliation to finish
    pub async fn shutdown(&self) {
        self.stop();
        let task = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!("Listener task failed: {}", e);
        }
    }
}
