//! Operator actions on delivered notices
//!
//! Buttons on a notice carry a custom id naming the action and the message
//! it applies to. [`ActionRequest`] round-trips that id and [`ActionHandler`]
//! carries the action out against the mailbox.

mod handler;

pub use handler::{ActionHandler, REPLY_MAX};

use std::fmt;

use crate::models::MessageId;

/// Kind of operator action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Reply,
    Delete,
    CopyCode,
}

impl ActionKind {
    fn prefix(self) -> &'static str {
        match self {
            ActionKind::Reply => "gmail_reply",
            ActionKind::Delete => "gmail_delete",
            ActionKind::CopyCode => "gmail_copy",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "gmail_reply" => Some(ActionKind::Reply),
            "gmail_delete" => Some(ActionKind::Delete),
            "gmail_copy" => Some(ActionKind::CopyCode),
            _ => None,
        }
    }
}

/// An action bound to one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRequest {
    pub kind: ActionKind,
    pub message_id: MessageId,
}

impl ActionRequest {
    pub fn new(kind: ActionKind, message_id: MessageId) -> Self {
        Self { kind, message_id }
    }

    /// Component custom id, e.g. `gmail_delete:18c2f0a`
    pub fn custom_id(&self) -> String {
        format!("{}:{}", self.kind.prefix(), self.message_id)
    }

    /// Parse a component custom id; `None` for ids not issued by us
    pub fn parse(custom_id: &str) -> Option<Self> {
        let (prefix, id) = custom_id.split_once(':')?;
        let kind = ActionKind::from_prefix(prefix)?;
        if id.is_empty() {
            return None;
        }
        Some(Self::new(kind, MessageId::new(id)))
    }
}

impl fmt::Display for ActionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.custom_id())
    }
}
