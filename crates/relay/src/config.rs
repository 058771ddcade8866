//! Configuration loading for the relay
//!
//! Two pieces of configuration live here:
//! - `GmailCredentials`, the OAuth client used to refresh the stored token,
//!   loaded from (in order of priority) compile-time embedded values, the
//!   Google Cloud Console JSON file, or runtime environment variables.
//! - `RelaySettings`, the pipeline settings, loaded from `herald.json` in the
//!   config directory and overridden by `HERALD_*` environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Credentials filename in the Herald config directory
const CREDENTIALS_FILE: &str = "google-credentials.json";

/// OAuth credentials for Gmail API access
#[derive(Debug, Clone)]
pub struct GmailCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google Cloud Console credential file format (installed app)
#[derive(Deserialize)]
struct GoogleCredentialFile {
    installed: Option<InstalledCredentials>,
    web: Option<InstalledCredentials>,
}

#[derive(Deserialize)]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,
}

impl GmailCredentials {
    /// Load credentials using the following priority:
    /// 1. Compile-time embedded credentials (for production builds)
    /// 2. JSON file (~/.config/herald/google-credentials.json)
    /// 3. Runtime environment variables
    pub fn load() -> Result<Self> {
        // Try compile-time embedded credentials first (production builds)
        if let Some(creds) = Self::from_compile_time() {
            return Ok(creds);
        }

        // Try default config file
        if config::config_exists(CREDENTIALS_FILE) {
            let creds: GoogleCredentialFile = config::load_json(CREDENTIALS_FILE)?;
            return Self::from_credential_file(creds);
        }

        // Fall back to runtime environment variables
        Self::from_env()
    }

    /// Load credentials embedded at compile time via environment variables.
    /// Build with: GOOGLE_CLIENT_ID=xxx GOOGLE_CLIENT_SECRET=yyy cargo build --release
    pub fn from_compile_time() -> Option<Self> {
        let client_id = option_env!("GOOGLE_CLIENT_ID")?;
        let client_secret = option_env!("GOOGLE_CLIENT_SECRET")?;

        // Only return if both are non-empty
        if client_id.is_empty() || client_secret.is_empty() {
            return None;
        }

        Some(Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        })
    }

    /// Load credentials from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let creds: GoogleCredentialFile = config::load_json_file(path)?;
        Self::from_credential_file(creds)
    }

    /// Parse credentials from a GoogleCredentialFile
    fn from_credential_file(creds: GoogleCredentialFile) -> Result<Self> {
        // Support both "installed" (desktop) and "web" credential types
        let installed = creds
            .installed
            .or(creds.web)
            .context("Credentials file missing 'installed' or 'web' section")?;

        Ok(Self {
            client_id: installed.client_id,
            client_secret: installed.client_secret,
        })
    }

    /// Parse credentials from JSON string (Google Cloud Console format)
    pub fn from_json(json: &str) -> Result<Self> {
        let creds: GoogleCredentialFile =
            serde_json::from_str(json).context("Failed to parse credentials JSON")?;
        Self::from_credential_file(creds)
    }

    /// Load credentials from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("GMAIL_CLIENT_ID")
            .context("GMAIL_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("GMAIL_CLIENT_SECRET")
            .context("GMAIL_CLIENT_SECRET environment variable not set")?;

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    /// Get the default credentials file path (~/.config/herald/google-credentials.json)
    pub fn default_credentials_path() -> Option<PathBuf> {
        config::config_path(CREDENTIALS_FILE)
    }

    /// Check if credentials are available (compile-time, file, or env vars)
    pub fn is_available() -> bool {
        // Check compile-time embedded credentials
        if Self::from_compile_time().is_some() {
            return true;
        }
        // Check config file
        if config::config_exists(CREDENTIALS_FILE) {
            return true;
        }
        // Check runtime environment variables
        std::env::var("GMAIL_CLIENT_ID").is_ok() && std::env::var("GMAIL_CLIENT_SECRET").is_ok()
    }
}

/// Settings filename in the Herald config directory
const SETTINGS_FILE: &str = "herald.json";

/// Invalid relay settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("setting `{0}` must not be empty")]
    Empty(&'static str),
    #[error("setting `{0}` must be greater than zero")]
    Zero(&'static str),
    #[error("environment variable {name} has an invalid value: {value}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Settings for the notification pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    /// Google Cloud project hosting the Pub/Sub topic
    pub gcp_project_id: String,
    /// Pub/Sub topic Gmail publishes to
    pub pubsub_topic: String,
    /// Pub/Sub subscription the relay pulls from
    pub pubsub_subscription: String,
    /// Gmail label the watch (and history expansion) is restricted to
    pub watch_label: String,
    /// Discord bot token used for operator DMs
    pub discord_bot_token: Option<String>,
    /// Discord user id of the operator
    pub admin_user_id: Option<u64>,
    /// SQLite database path; defaults to herald.db in the config directory
    pub database_path: Option<PathBuf>,
    /// Stored OAuth token file, relative to the config directory
    pub token_file: String,
    /// Seconds between watch freshness checks
    pub renewal_interval_secs: u64,
    /// Renew once the watch has less than this many seconds left
    pub renewal_threshold_secs: u64,
    /// Capacity of the feed-to-scheduler queue
    pub feed_queue_capacity: usize,
    /// Maximum concurrent blocking remote calls
    pub blocking_workers: usize,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            gcp_project_id: String::new(),
            pubsub_topic: "gmail-notifications".to_string(),
            pubsub_subscription: "gmail-sub".to_string(),
            watch_label: "INBOX".to_string(),
            discord_bot_token: None,
            admin_user_id: None,
            database_path: None,
            token_file: "gmail-tokens.json".to_string(),
            renewal_interval_secs: 6 * 3600,
            renewal_threshold_secs: 24 * 3600,
            feed_queue_capacity: 64,
            blocking_workers: 4,
        }
    }
}

impl RelaySettings {
    /// Load settings from herald.json (if present) and the environment
    pub fn load() -> Result<Self> {
        let mut settings = if config::config_exists(SETTINGS_FILE) {
            config::load_json(SETTINGS_FILE)?
        } else {
            Self::default()
        };
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a specific JSON file, then apply the environment
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut settings: Self = config::load_json_file(path)?;
        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Override fields from `HERALD_*` variables provided by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("HERALD_GCP_PROJECT") {
            self.gcp_project_id = v;
        }
        if let Some(v) = lookup("HERALD_PUBSUB_TOPIC") {
            self.pubsub_topic = v;
        }
        if let Some(v) = lookup("HERALD_PUBSUB_SUBSCRIPTION") {
            self.pubsub_subscription = v;
        }
        if let Some(v) = lookup("HERALD_DISCORD_TOKEN") {
            self.discord_bot_token = Some(v);
        }
        if let Some(v) = lookup("HERALD_ADMIN_USER_ID") {
            let id = v.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                name: "HERALD_ADMIN_USER_ID",
                value: v.clone(),
            })?;
            self.admin_user_id = Some(id);
        }
        if let Some(v) = lookup("HERALD_DATABASE") {
            self.database_path = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.gcp_project_id.trim().is_empty() {
            return Err(SettingsError::Empty("gcp_project_id"));
        }
        if self.pubsub_topic.trim().is_empty() {
            return Err(SettingsError::Empty("pubsub_topic"));
        }
        if self.pubsub_subscription.trim().is_empty() {
            return Err(SettingsError::Empty("pubsub_subscription"));
        }
        if self.renewal_interval_secs == 0 {
            return Err(SettingsError::Zero("renewal_interval_secs"));
        }
        if self.feed_queue_capacity == 0 {
            return Err(SettingsError::Zero("feed_queue_capacity"));
        }
        if self.blocking_workers == 0 {
            return Err(SettingsError::Zero("blocking_workers"));
        }
        Ok(())
    }

    /// Fully-qualified Pub/Sub topic name passed to `users.watch`
    pub fn topic_name(&self) -> String {
        format!("projects/{}/topics/{}", self.gcp_project_id, self.pubsub_topic)
    }

    /// Fully-qualified Pub/Sub subscription path
    pub fn subscription_path(&self) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            self.gcp_project_id, self.pubsub_subscription
        )
    }

    pub fn renewal_interval(&self) -> Duration {
        Duration::from_secs(self.renewal_interval_secs)
    }

    pub fn renewal_threshold(&self) -> Duration {
        Duration::from_secs(self.renewal_threshold_secs)
    }

    /// Resolve the database path, falling back to the config directory
    pub fn resolve_database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config::ensure_config_dir()?.join("herald.db")),
        }
    }

    /// Resolve the stored token path in the config directory
    pub fn resolve_token_path(&self) -> Result<PathBuf> {
        let path = Path::new(&self.token_file);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }
        config::config_path(&self.token_file).context("Could not determine config directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installed_credentials() {
        let json = r#"{
            "installed": {
                "client_id": "test-client-id.apps.googleusercontent.com",
                "client_secret": "test-secret",
                "auth_uri": "https://accounts.google.com/o/oauth2/auth",
                "token_uri": "https://oauth2.googleapis.com/token"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "test-client-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "test-secret");
    }

    #[test]
    fn test_parse_web_credentials() {
        let json = r#"{
            "web": {
                "client_id": "web-client-id.apps.googleusercontent.com",
                "client_secret": "web-secret"
            }
        }"#;

        let creds = GmailCredentials::from_json(json).unwrap();
        assert_eq!(creds.client_id, "web-client-id.apps.googleusercontent.com");
        assert_eq!(creds.client_secret, "web-secret");
    }

    #[test]
    fn test_invalid_json() {
        let json = r#"{ "other": {} }"#;
        assert!(GmailCredentials::from_json(json).is_err());
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: std::collections::HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_settings_need_project() {
        let settings = RelaySettings::default();
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Empty("gcp_project_id"))
        ));
        assert_eq!(settings.renewal_threshold(), Duration::from_secs(86_400));
        assert_eq!(settings.renewal_interval(), Duration::from_secs(21_600));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings = RelaySettings::default();
        settings
            .apply_env(env(&[
                ("HERALD_GCP_PROJECT", "demo-project"),
                ("HERALD_PUBSUB_SUBSCRIPTION", "relay-sub"),
                ("HERALD_ADMIN_USER_ID", "1399234194281861201"),
            ]))
            .unwrap();

        assert!(settings.validate().is_ok());
        assert_eq!(settings.admin_user_id, Some(1399234194281861201));
        assert_eq!(
            settings.topic_name(),
            "projects/demo-project/topics/gmail-notifications"
        );
        assert_eq!(
            settings.subscription_path(),
            "projects/demo-project/subscriptions/relay-sub"
        );
    }

    #[test]
    fn test_invalid_admin_id_env() {
        let mut settings = RelaySettings::default();
        let err = settings
            .apply_env(env(&[("HERALD_ADMIN_USER_ID", "not-a-number")]))
            .unwrap_err();
        assert!(matches!(err, SettingsError::InvalidEnv { .. }));
    }

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let settings: RelaySettings =
            serde_json::from_str(r#"{ "gcp_project_id": "p", "feed_queue_capacity": 0 }"#).unwrap();
        assert_eq!(settings.watch_label, "INBOX");
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Zero("feed_queue_capacity"))
        ));
    }
}
