//! Database row types. These map directly to SQLite rows.
//! Distinct from chatter-types API models to keep the DB layer independent.

use chrono::{DateTime, Utc};

use chatter_types::api::NewAttachment;
use chatter_types::models::{Attachment, AttachmentType, Message, MessageType, User};

use crate::{DbError, Result};

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Drop the credential and expose the public view.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            bio: self.bio,
            avatar_url: self.avatar_url,
            last_seen_at: self.last_seen_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

pub struct NewChat {
    pub is_group: bool,
    pub name: Option<String>,
}

pub struct NewMessage {
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub message_type: MessageType,
    pub content: Option<String>,
    pub reply_to_id: Option<i64>,
    pub attachments: Vec<NewAttachment>,
}

pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    pub message_type: String,
    pub content: Option<String>,
    pub reply_to_id: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MessageRow {
    /// The effective view of a stored message: every read path goes through
    /// here. A soft-deleted row becomes a tombstone whatever is still stored.
    pub fn into_message(self, attachments: Vec<Attachment>) -> Result<Message> {
        if self.deleted_at.is_some() {
            return Ok(Message {
                id: self.id,
                chat_id: self.chat_id,
                sender_id: self.sender_id,
                message_type: MessageType::Deleted,
                content: None,
                reply_to_id: self.reply_to_id,
                deleted_at: self.deleted_at,
                edited_at: self.edited_at,
                created_at: self.created_at,
                attachments: Vec::new(),
            });
        }

        let message_type = self
            .message_type
            .parse()
            .map_err(|e| DbError::Corrupt(format!("message {}: {}", self.id, e)))?;

        Ok(Message {
            id: self.id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            message_type,
            content: self.content,
            reply_to_id: self.reply_to_id,
            deleted_at: None,
            edited_at: self.edited_at,
            created_at: self.created_at,
            attachments,
        })
    }
}

pub struct AttachmentRow {
    pub id: i64,
    pub message_id: i64,
    pub attachment_type: String,
    pub url: String,
    pub filename: Option<String>,
    pub size: Option<i64>,
    pub metadata: String,
    pub created_at: DateTime<Utc>,
}

impl AttachmentRow {
    pub fn into_attachment(self) -> Result<Attachment> {
        let attachment_type: AttachmentType = self
            .attachment_type
            .parse()
            .map_err(|e| DbError::Corrupt(format!("attachment {}: {}", self.id, e)))?;
        let metadata = serde_json::from_str(&self.metadata)
            .map_err(|e| DbError::Corrupt(format!("attachment {} metadata: {}", self.id, e)))?;

        Ok(Attachment {
            id: self.id,
            message_id: self.message_id,
            attachment_type,
            url: self.url,
            filename: self.filename,
            size: self.size,
            metadata,
            created_at: self.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(deleted: bool) -> MessageRow {
        MessageRow {
            id: 3,
            chat_id: 1,
            sender_id: Some(9),
            message_type: "text".into(),
            content: Some("secret".into()),
            reply_to_id: None,
            deleted_at: deleted.then(Utc::now),
            edited_at: None,
            created_at: Utc::now(),
        }
    }

    fn attachment() -> Attachment {
        Attachment {
            id: 1,
            message_id: 3,
            attachment_type: AttachmentType::Image,
            url: "https://cdn.example/cat.png".into(),
            filename: None,
            size: None,
            metadata: serde_json::json!({}),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn visible_row_keeps_content() {
        let msg = row(false).into_message(vec![attachment()]).unwrap();
        assert_eq!(msg.message_type, MessageType::Text);
        assert_eq!(msg.content.as_deref(), Some("secret"));
        assert_eq!(msg.attachments.len(), 1);
    }

    #[test]
    fn deleted_row_becomes_tombstone() {
        let msg = row(true).into_message(vec![attachment()]).unwrap();
        assert_eq!(msg.message_type, MessageType::Deleted);
        assert!(msg.content.is_none());
        assert!(msg.attachments.is_empty());
        assert_eq!(msg.sender_id, Some(9));
    }

    #[test]
    fn unknown_stored_type_is_corrupt() {
        let mut r = row(false);
        r.message_type = "video".into();
        assert!(matches!(r.into_message(vec![]), Err(DbError::Corrupt(_))));
    }
}
