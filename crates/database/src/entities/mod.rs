//! Domain entities for the database layer

pub mod chat;
pub mod message;

pub use chat::Conversation;
pub use message::{Message, MessageKind, NewMessage};

pub type UserId = i64;
pub type ConversationId = i64;
pub type MessageId = i64;

/// Current time in the storage format used by every timestamp column.
///
/// Fixed-width RFC 3339 in UTC, so lexical order equals chronological order.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
