//! Google Cloud Pub/Sub pull subscriber
//!
//! Pulls Gmail change notifications over the Pub/Sub REST API on a dedicated
//! thread. Uses synchronous HTTP (ureq).

use anyhow::{Context, Result};
use base64::prelude::*;
use log::{debug, error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;

use super::{FeedSubscription, PushFeed};
use crate::gmail::GoogleAuth;
use crate::models::PushNotification;

/// Messages requested per pull
const MAX_MESSAGES: u32 = 10;

const BACKOFF_START: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(60);

/// Granularity at which a sleeping worker notices a stop request
const STOP_POLL: Duration = Duration::from_millis(100);

/// Upper bound on one pull long-poll; a stop request waits at most this long
const PULL_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullResponse {
    #[serde(default)]
    received_messages: Vec<ReceivedMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivedMessage {
    ack_id: String,
    message: PubSubMessage,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PubSubMessage {
    data: Option<String>,
    #[serde(default)]
    message_id: String,
}

/// Pull subscriber for the Gmail notification topic
pub struct PubSubFeed {
    auth: Arc<GoogleAuth>,
    /// `projects/{project}/subscriptions/{subscription}`
    subscription: String,
}

impl PubSubFeed {
    const BASE_URL: &'static str = "https://pubsub.googleapis.com/v1";

    pub fn new(auth: Arc<GoogleAuth>, subscription: impl Into<String>) -> Self {
        Self {
            auth,
            subscription: subscription.into(),
        }
    }
}

impl PushFeed for PubSubFeed {
    fn subscribe(&self, sender: mpsc::Sender<PushNotification>) -> Result<FeedSubscription> {
        let stopped = Arc::new(AtomicBool::new(false));
        let worker = PullWorker {
            auth: self.auth.clone(),
            subscription: self.subscription.clone(),
            sender,
            stopped: stopped.clone(),
        };

        thread::Builder::new()
            .name("pubsub-pull".into())
            .spawn(move || worker.run())
            .context("Failed to spawn Pub/Sub pull thread")?;

        info!("Listening on {}", self.subscription);
        Ok(FeedSubscription::new(self.subscription.clone(), stopped))
    }
}

struct PullWorker {
    auth: Arc<GoogleAuth>,
    subscription: String,
    sender: mpsc::Sender<PushNotification>,
    stopped: Arc<AtomicBool>,
}

impl PullWorker {
    fn run(self) {
        let mut backoff = Backoff::new();

        while !self.stopped.load(Ordering::SeqCst) {
            match self.pull() {
                Ok(received) => {
                    backoff.reset();
                    if received.is_empty() {
                        continue;
                    }

                    let handoff = hand_off(received, &self.sender, &self.stopped);
                    if !handoff.ack_ids.is_empty()
                        && let Err(e) = self.acknowledge(&handoff.ack_ids)
                    {
                        // Unacked messages are redelivered; the listener drops replays
                        warn!("Failed to acknowledge {} messages: {:#}", handoff.ack_ids.len(), e);
                    }
                    if !handoff.open {
                        warn!("Notification channel closed, leaving remaining messages for redelivery");
                        break;
                    }
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    error!("Pub/Sub pull failed, retrying in {}s: {:#}", delay.as_secs(), e);
                    self.sleep(delay);
                }
            }
        }

        info!("Pub/Sub pull worker for {} exited", self.subscription);
    }

    fn sleep(&self, duration: Duration) {
        let mut remaining = duration;
        while remaining > Duration::ZERO && !self.stopped.load(Ordering::SeqCst) {
            let tick = remaining.min(STOP_POLL);
            thread::sleep(tick);
            remaining = remaining.saturating_sub(tick);
        }
    }

    fn url(&self, verb: &str) -> String {
        format!("{}/{}:{}", PubSubFeed::BASE_URL, self.subscription, verb)
    }

    fn pull(&self) -> Result<Vec<ReceivedMessage>> {
        let token = self.auth.get_access_token()?;
        let response = ureq::post(&self.url("pull"))
            .config()
            .timeout_global(Some(PULL_TIMEOUT))
            .build()
            .header("Authorization", &format!("Bearer {}", token))
            .send_json(json!({ "maxMessages": MAX_MESSAGES }));
        let mut response = match response {
            Ok(response) => response,
            Err(e) => return empty_on_timeout(e),
        };

        let pulled: PullResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse pull response")?;
        Ok(pulled.received_messages)
    }

    fn acknowledge(&self, ack_ids: &[String]) -> Result<()> {
        let token = self.auth.get_access_token()?;
        ureq::post(&self.url("acknowledge"))
            .header("Authorization", &format!("Bearer {}", token))
            .send_json(json!({ "ackIds": ack_ids }))
            .context("Acknowledge request failed")?;
        Ok(())
    }
}

/// An idle long-poll that hit the timeout is an empty pull, not a failure
fn empty_on_timeout(e: ureq::Error) -> Result<Vec<ReceivedMessage>> {
    match e {
        ureq::Error::Timeout(_) => Ok(Vec::new()),
        e => Err(e).context("Pull request failed"),
    }
}

/// Result of handing a pulled batch to the scheduler
#[derive(Debug, Default)]
struct HandOff {
    /// Messages that may be acknowledged
    ack_ids: Vec<String>,
    /// Whether the receiving side is still there
    open: bool,
}

/// Push decoded notifications into the channel, blocking while it is full
///
/// A message is acknowledged once it was handed off, or when its payload can
/// never be decoded. Messages left after a stop request or a closed channel
/// are not acknowledged so the feed redelivers them.
fn hand_off(
    received: Vec<ReceivedMessage>,
    sender: &mpsc::Sender<PushNotification>,
    stopped: &AtomicBool,
) -> HandOff {
    let mut handoff = HandOff {
        ack_ids: Vec::with_capacity(received.len()),
        open: true,
    };

    for received in received {
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        match decode_notification(&received.message) {
            Ok(notification) => {
                debug!(
                    "Received notification {} (historyId {})",
                    received.message.message_id, notification.history_id
                );
                if sender.blocking_send(notification).is_err() {
                    handoff.open = false;
                    break;
                }
                handoff.ack_ids.push(received.ack_id);
            }
            Err(e) => {
                warn!(
                    "Discarding undecodable message {}: {:#}",
                    received.message.message_id, e
                );
                handoff.ack_ids.push(received.ack_id);
            }
        }
    }

    handoff
}

fn decode_notification(message: &PubSubMessage) -> Result<PushNotification> {
    let data = message.data.as_deref().context("Message has no data")?;
    let bytes = BASE64_STANDARD
        .decode(data)
        .or_else(|_| BASE64_URL_SAFE.decode(data))
        .context("Message data is not base64")?;
    PushNotification::from_slice(&bytes)
}

/// Exponential retry delay for failed pulls
struct Backoff {
    current: Duration,
}

impl Backoff {
    fn new() -> Self {
        Self {
            current: BACKOFF_START,
        }
    }

    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(BACKOFF_MAX);
        delay
    }

    fn reset(&mut self) {
        self.current = BACKOFF_START;
    }
}
