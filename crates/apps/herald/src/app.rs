//! Herald application wiring
//!
//! Builds the pipeline components from settings and runs the CLI commands
//! against them. Every component receives its dependencies explicitly.

use anyhow::{Context, Result};
use log::{error, info};
use std::sync::Arc;
use tokio::sync::watch;

use relay::{
    ActionHandler, BlockingPool, DeliverySink, DiscordDmSink, GmailClient, GmailCredentials,
    GoogleAuth, MailService, MessageId, NotificationListener, ProcessOutcome, PubSubFeed,
    RelaySettings, SqliteWatchStore, WatchManager, WatchStore,
};

/// How many pending events `status` lists
const STATUS_PENDING_LIMIT: usize = 20;

/// Open the event ledger named by `settings`
pub fn open_store(settings: &RelaySettings) -> Result<Arc<dyn WatchStore>> {
    let path = settings.resolve_database_path()?;
    let store = SqliteWatchStore::open(&path)?;
    info!("Using database {}", path.display());
    Ok(Arc::new(store))
}

/// Print the watch record and events still waiting for delivery
pub fn print_status(store: &dyn WatchStore) -> Result<()> {
    match store.get_watch_record()? {
        Some(record) => {
            let expires = record
                .expires_at()
                .map_or_else(|| record.expiration_ms.to_string(), |t| t.to_rfc3339());
            println!("Watch");
            println!("  expires:  {}", expires);
            println!("  remaining: {}h", record.remaining(chrono::Utc::now()).num_hours());
            println!("  cursor:   {}", record.history_cursor);
            println!("  created:  {}", record.created_at.to_rfc3339());
            if let Some(renewed) = record.renewed_at {
                println!("  renewed:  {}", renewed.to_rfc3339());
            }
        }
        None => println!("No watch established"),
    }

    let pending = store.list_unnotified(STATUS_PENDING_LIMIT)?;
    if pending.is_empty() {
        println!("No undelivered messages");
    } else {
        println!("Undelivered messages");
        for event in pending {
            println!(
                "  {}  {}  {} | {}",
                event.received_at.format("%Y-%m-%d %H:%M"),
                event.message_id,
                event.from_email,
                event.subject
            );
        }
    }
    Ok(())
}

/// Fully wired pipeline components
pub struct Herald {
    settings: RelaySettings,
    store: Arc<dyn WatchStore>,
    auth: Arc<GoogleAuth>,
    pool: BlockingPool,
    mail: MailService,
}

impl Herald {
    pub fn new(settings: RelaySettings) -> Result<Self> {
        let store = open_store(&settings)?;
        let credentials = GmailCredentials::load().context("Gmail credentials not found")?;
        let auth = Arc::new(GoogleAuth::new(credentials, settings.resolve_token_path()?));
        let pool = BlockingPool::new(settings.blocking_workers);
        let mail = MailService::new(Arc::new(GmailClient::new(auth.clone())), pool.clone());

        Ok(Self {
            settings,
            store,
            auth,
            pool,
            mail,
        })
    }

    fn watch_manager(&self) -> WatchManager {
        WatchManager::new(
            self.mail.clone(),
            self.store.clone(),
            self.settings.topic_name(),
            vec![self.settings.watch_label.clone()],
            self.settings.renewal_threshold(),
        )
    }

    fn sink(&self) -> Result<Arc<dyn DeliverySink>> {
        let token = self
            .settings
            .discord_bot_token
            .clone()
            .context("Discord bot token not configured (HERALD_DISCORD_TOKEN)")?;
        let admin = self
            .settings
            .admin_user_id
            .context("Operator user id not configured (HERALD_ADMIN_USER_ID)")?;
        Ok(Arc::new(DiscordDmSink::new(token, admin, self.pool.clone())))
    }

    fn listener(&self) -> Result<NotificationListener> {
        Ok(NotificationListener::new(
            self.mail.clone(),
            self.store.clone(),
            self.sink()?,
            Some(self.settings.watch_label.clone()),
        ))
    }

    /// Operator action handler over the same mailbox and ledger
    pub fn actions(&self) -> ActionHandler {
        ActionHandler::new(self.mail.clone(), self.store.clone())
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<()> {
        let listener = Arc::new(self.listener()?);
        let manager = Arc::new(self.watch_manager());
        let feed = PubSubFeed::new(self.auth.clone(), self.settings.subscription_path());

        let (ready_tx, ready_rx) = watch::channel(false);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let renewal = tokio::spawn({
            let manager = manager.clone();
            let interval = self.settings.renewal_interval();
            async move { manager.run_periodic(interval, ready_rx, shutdown_rx).await }
        });

        let handle = listener.start(&feed, self.settings.feed_queue_capacity)?;
        ready_tx.send_replace(true);
        info!("Herald running, press Ctrl-C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
        }
        info!("Shutting down");

        handle.shutdown().await;
        shutdown_tx.send_replace(true);
        if let Err(e) = renewal.await {
            error!("Renewal task failed: {}", e);
        }
        manager.teardown().await;
        Ok(())
    }

    /// Deliver one message again, ignoring the cursor and the ledger
    pub async fn reprocess(&self, message_id: &str) -> Result<()> {
        let listener = self.listener()?;
        match listener.reprocess(&MessageId::new(message_id)).await? {
            ProcessOutcome::Delivered => println!("Delivered {}", message_id),
            ProcessOutcome::DeliveryFailed => anyhow::bail!("Delivery of {} failed", message_id),
            ProcessOutcome::AlreadyLogged => println!("{} already handled", message_id),
        }
        Ok(())
    }

    /// Establish a new watch now
    pub async fn renew(&self) -> Result<()> {
        if !self.watch_manager().establish().await {
            anyhow::bail!("Failed to establish watch");
        }
        print_status(self.store.as_ref())
    }

    /// Stop the remote watch
    pub async fn stop_watch(&self) {
        self.watch_manager().teardown().await;
    }
}
