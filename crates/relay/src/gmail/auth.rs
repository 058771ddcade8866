//! Google OAuth2 token handle
//!
//! Loads a previously authorized token from disk and keeps it fresh using the
//! refresh token. Obtaining the initial authorization is outside this crate;
//! the token file is expected to exist.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::GmailCredentials;

/// Shared credential handle for Google APIs (Gmail, Pub/Sub)
///
/// Constructed once by the host and passed to every client that needs it.
pub struct GoogleAuth {
    credentials: GmailCredentials,
    token_path: PathBuf,
    /// Serializes refreshes so concurrent callers don't race on the token file
    refresh_lock: Mutex<()>,
}

/// Stored token data
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
}

/// Token response from Google
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

impl GoogleAuth {
    const TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Seconds of validity required before a stored token is reused
    const EXPIRY_BUFFER_SECS: i64 = 300;

    /// Create a new token handle backed by `token_path`
    pub fn new(credentials: GmailCredentials, token_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials,
            token_path: token_path.into(),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Path of the token file
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Get a valid access token, refreshing it if needed
    pub fn get_access_token(&self) -> Result<String> {
        let _guard = self
            .refresh_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Token lock poisoned"))?;

        let token = self.load_token().with_context(|| {
            format!(
                "No stored Google token at {}; authorize the account first",
                self.token_path.display()
            )
        })?;

        if let Some(expires_at) = token.expires_at {
            let now = chrono::Utc::now().timestamp();
            if expires_at > now + Self::EXPIRY_BUFFER_SECS {
                return Ok(token.access_token);
            }
        }

        let refresh_token = token
            .refresh_token
            .context("Stored Google token expired and has no refresh token")?;
        let new_token = self.refresh_access_token(&refresh_token)?;
        self.save_token_response(&new_token)?;
        log::debug!("Refreshed Google access token");
        Ok(new_token.access_token)
    }

    /// Check whether a usable token is stored (without refreshing)
    pub fn has_token(&self) -> bool {
        self.load_token()
            .map(|t| t.refresh_token.is_some() || t.expires_at.is_some())
            .unwrap_or(false)
    }

    /// Refresh an access token using a refresh token
    fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let response = ureq::post(Self::TOKEN_URL)
            .send_form([
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .context("Failed to refresh access token")?;

        let mut token: TokenResponse = response
            .into_body()
            .read_json()
            .context("Failed to parse refresh token response")?;

        // Preserve the refresh token if not returned
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.to_string());
        }

        Ok(token)
    }

    /// Load stored token from disk
    fn load_token(&self) -> Result<StoredToken> {
        config::load_json_file(&self.token_path)
    }

    /// Save token response to disk
    fn save_token_response(&self, token: &TokenResponse) -> Result<()> {
        let stored = StoredToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|d| chrono::Utc::now().timestamp() + d as i64),
        };
        config::save_json_file(&self.token_path, &stored)
    }
}
