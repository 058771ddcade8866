//! Watch establishment and periodic renewal

use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::time::MissedTickBehavior;

use super::timing::renewal_due;
use crate::gmail::MailService;
use crate::storage::WatchStore;

/// Result of a freshness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalDecision {
    /// Enough lifetime left; nothing was done
    Fresh,
    /// A watch was established or renewed
    Renewed,
    /// Renewal was needed but failed; state is unchanged
    Failed,
}

/// Owns the server-side watch
pub struct WatchManager {
    mail: MailService,
    store: Arc<dyn WatchStore>,
    /// Fully-qualified Pub/Sub topic
    topic: String,
    label_ids: Vec<String>,
    threshold: Duration,
    /// Serializes establish-then-replace
    establish_lock: Mutex<()>,
}

impl WatchManager {
    pub fn new(
        mail: MailService,
        store: Arc<dyn WatchStore>,
        topic: impl Into<String>,
        label_ids: Vec<String>,
        threshold: Duration,
    ) -> Self {
        Self {
            mail,
            store,
            topic: topic.into(),
            label_ids,
            threshold,
            establish_lock: Mutex::new(()),
        }
    }

    /// Request a new watch and replace the stored record with it
    ///
    /// Returns `false` and leaves the stored record untouched on failure.
    pub async fn establish(&self) -> bool {
        let _guard = self.establish_lock.lock().await;

        let grant = match self.mail.watch(&self.topic, &self.label_ids).await {
            Ok(grant) => grant,
            Err(e) => {
                error!("Failed to establish watch on {}: {:#}", self.topic, e);
                return false;
            }
        };

        let renewing = matches!(self.store.get_watch_record(), Ok(Some(_)));
        let record = match self
            .store
            .replace_watch_record(grant.expiration_ms, grant.history_baseline)
        {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to store watch record: {:#}", e);
                return false;
            }
        };
        if renewing && let Err(e) = self.store.touch_renewed() {
            warn!("Failed to record renewal time: {:#}", e);
        }

        info!(
            "Watch {} (expires {}, cursor {})",
            if renewing { "renewed" } else { "established" },
            record
                .expires_at()
                .map_or_else(|| record.expiration_ms.to_string(), |t| t.to_rfc3339()),
            record.history_cursor
        );
        true
    }

    /// Establish a watch if none exists or the current one is close to expiry
    ///
    /// Safe to call arbitrarily often; a fresh watch costs no remote calls.
    pub async fn ensure_fresh(&self) -> RenewalDecision {
        let record = match self.store.get_watch_record() {
            Ok(record) => record,
            Err(e) => {
                error!("Failed to read watch record: {:#}", e);
                return RenewalDecision::Failed;
            }
        };

        match record {
            Some(record) if !renewal_due(record.expiration_ms, Utc::now(), self.threshold) => {
                debug!(
                    "Watch fresh, {}h remaining",
                    record.remaining(Utc::now()).num_hours()
                );
                return RenewalDecision::Fresh;
            }
            Some(_) => info!("Watch expires within {}h, renewing", self.threshold.as_secs() / 3600),
            None => info!("No watch record, establishing"),
        }

        if self.establish().await {
            RenewalDecision::Renewed
        } else {
            RenewalDecision::Failed
        }
    }

    /// Check freshness every `interval` until `shutdown` turns true
    ///
    /// Nothing happens before `ready` turns true. The first check runs as
    /// soon as the host is ready.
    pub async fn run_periodic(
        &self,
        interval: Duration,
        mut ready: watch::Receiver<bool>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        // The channel guards returned by `wait_for` must not outlive the select
        let became_ready = tokio::select! {
            is_ready = async { ready.wait_for(|ready| *ready).await.is_ok() } => is_ready,
            _ = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => false,
        };
        if !became_ready {
            info!("Shut down before the host became ready");
            return;
        }

        info!("Watch renewal every {}s", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.ensure_fresh().await == RenewalDecision::Failed {
                        warn!("Watch renewal failed, retrying in {}s", interval.as_secs());
                    }
                }
                _ = async { shutdown.wait_for(|stop| *stop).await.is_ok() } => break,
            }
        }
        info!("Watch renewal loop stopped");
    }

    /// Best-effort stop of the remote watch
    ///
    /// A stopped watch is marked expired so the next `ensure_fresh`
    /// establishes a new one.
    pub async fn teardown(&self) {
        if let Err(e) = self.mail.stop_watch().await {
            warn!("Failed to stop watch: {:#}", e);
            return;
        }
        info!("Watch stopped");
        if let Err(e) = self.store.expire_watch() {
            warn!("Failed to mark stopped watch expired: {:#}", e);
        }
    }
}
