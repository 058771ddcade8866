//! Gmail API response normalization
//!
//! Pulls headers and readable text out of Gmail message payloads.

use base64::prelude::*;

use super::api::MessagePayload;

/// Extract a header value by name (case-insensitive)
pub fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Extract the plain text body of a message
///
/// Every `text/plain` part is collected depth-first and joined with newlines.
/// Returns an empty string when the message has no plain text content.
pub fn extract_body_text(payload: &MessagePayload) -> String {
    let mut parts = Vec::new();
    collect_plain_text(payload, &mut parts);
    parts.join("\n")
}

/// Recursively search message parts for text/plain content
fn collect_plain_text(payload: &MessagePayload, out: &mut Vec<String>) {
    if payload
        .mime_type
        .as_ref()
        .is_some_and(|m| m.starts_with("text/plain"))
        && let Some(body) = &payload.body
        && let Some(data) = &body.data
    {
        if let Some(text) = decode_base64_body(data) {
            out.push(text);
        }
        return;
    }

    if let Some(parts) = &payload.parts {
        for part in parts {
            collect_plain_text(part, out);
        }
    }
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
/// Invalid UTF-8 sequences are replaced rather than rejected.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    decoders
        .iter()
        .find_map(|decoder| decoder.decode(data).ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
