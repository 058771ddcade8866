//! Domain models for the notification pipeline

mod message;
mod notification;
mod watch_record;

pub use message::{MessageEvent, MessageEventBuilder, MessageId, ThreadId};
pub use notification::PushNotification;
pub use watch_record::WatchRecord;
