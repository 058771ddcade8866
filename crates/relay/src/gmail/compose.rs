//! Reply composition

use base64::prelude::*;

/// Build a base64url-encoded RFC 5322 plain text reply
///
/// The subject gets a single `Re:` prefix. When the original `Message-ID` is
/// known it is threaded through `In-Reply-To` and `References`.
pub fn compose_reply(to: &str, subject: &str, in_reply_to: Option<&str>, text: &str) -> String {
    let subject = reply_subject(subject);

    let mut message = String::new();
    message.push_str(&format!("To: {}\r\n", strip_line_breaks(to)));
    message.push_str(&format!("Subject: {}\r\n", strip_line_breaks(&subject)));
    if let Some(id) = in_reply_to {
        let id = strip_line_breaks(id);
        message.push_str(&format!("In-Reply-To: {}\r\n", id));
        message.push_str(&format!("References: {}\r\n", id));
    }
    message.push_str("MIME-Version: 1.0\r\n");
    message.push_str("Content-Type: text/plain; charset=\"UTF-8\"\r\n");
    message.push_str("Content-Transfer-Encoding: 8bit\r\n");
    message.push_str("\r\n");
    message.push_str(&text.replace("\r\n", "\n").replace('\n', "\r\n"));

    BASE64_URL_SAFE.encode(message.as_bytes())
}

fn reply_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    if trimmed.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("re:")) {
        trimmed.to_string()
    } else {
        format!("Re: {}", trimmed)
    }
}

/// Header values must not smuggle extra headers
fn strip_line_breaks(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
