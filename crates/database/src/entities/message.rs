//! Message entity

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{ConversationId, MessageId, UserId};
use crate::types::DatabaseError;

/// Payload kind of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Video,
    Audio,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Video => "video",
            MessageKind::Audio => "audio",
            MessageKind::File => "file",
        }
    }

    /// Everything except text travels as an attachment.
    pub fn is_attachment(&self) -> bool {
        !matches!(self, MessageKind::Text)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "text" => Ok(MessageKind::Text),
            "image" => Ok(MessageKind::Image),
            "video" => Ok(MessageKind::Video),
            "audio" => Ok(MessageKind::Audio),
            "file" => Ok(MessageKind::File),
            other => Err(DatabaseError::Decode(format!("unknown message kind '{other}'"))),
        }
    }
}

/// A persisted message together with its read set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
    pub read_by: BTreeSet<UserId>,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment_url: Option<String>,
}

impl NewMessage {
    pub fn text(conversation_id: ConversationId, sender_id: UserId, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender_id,
            kind: MessageKind::Text,
            content: Some(content.into()),
            attachment_url: None,
        }
    }

    pub fn attachment(
        conversation_id: ConversationId,
        sender_id: UserId,
        kind: MessageKind,
        attachment_url: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            sender_id,
            kind,
            content: None,
            attachment_url: Some(attachment_url.into()),
        }
    }

    /// Text messages need content, attachment kinds need a url.
    pub fn validate(&self) -> Result<(), DatabaseError> {
        let has_content = self
            .content
            .as_deref()
            .is_some_and(|content| !content.trim().is_empty());
        let has_attachment = self
            .attachment_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty());

        if self.kind.is_attachment() {
            if !has_attachment {
                return Err(DatabaseError::Validation(format!(
                    "{} messages require an attachment_url",
                    self.kind
                )));
            }
        } else if !has_content {
            return Err(DatabaseError::Validation(
                "text messages require non-empty content".to_string(),
            ));
        }

        Ok(())
    }
}
