//! Gmail push notification payload

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

/// A "something changed" signal delivered through the push feed
///
/// Gmail publishes `{"emailAddress": "...", "historyId": 1234}` to the
/// Pub/Sub topic. The history id is usually a JSON number but is accepted as
/// a decimal string as well.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    /// Mailbox the change belongs to
    #[serde(default)]
    pub email_address: String,
    /// Mailbox history position at the time of the change
    #[serde(deserialize_with = "history_id_from_any")]
    pub history_id: u64,
}

impl PushNotification {
    pub fn new(email_address: impl Into<String>, history_id: u64) -> Self {
        Self {
            email_address: email_address.into(),
            history_id,
        }
    }

    /// Decode a notification from the raw (already base64-decoded) payload
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).context("Failed to parse push notification payload")
    }
}

fn history_id_from_any<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(u64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_history_id() {
        let n = PushNotification::from_slice(
            br#"{"emailAddress":"user@example.com","historyId":9876}"#,
        )
        .unwrap();
        assert_eq!(n.email_address, "user@example.com");
        assert_eq!(n.history_id, 9876);
    }

    #[test]
    fn test_string_history_id() {
        let n = PushNotification::from_slice(br#"{"emailAddress":"a@b.c","historyId":"123"}"#)
            .unwrap();
        assert_eq!(n.history_id, 123);
    }

    #[test]
    fn test_missing_history_id_is_error() {
        assert!(PushNotification::from_slice(br#"{"emailAddress":"a@b.c"}"#).is_err());
        assert!(PushNotification::from_slice(br#"{"historyId":"abc"}"#).is_err());
    }
}
