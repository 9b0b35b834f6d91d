use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

// -- Users --

/// Public view of a user. The password hash never leaves `chatter-db`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Chats --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub is_group: bool,
    pub name: Option<String>,
    pub created_by: i64,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Membership --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Map untrusted input onto a role. Anything unrecognized becomes
    /// `Member`; input is never rejected.
    pub fn coerce(raw: &str) -> Self {
        let normalized = raw.trim().to_lowercase();
        normalized.parse().unwrap_or_else(|_| {
            warn!("Unrecognized role '{}', defaulting to member", raw);
            Self::Member
        })
    }

    /// Owners and admins may manage the chat and its members.
    pub fn can_manage(self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Strict parse, used for values read back from storage.
impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMember {
    pub chat_id: i64,
    pub user_id: i64,
    pub role: Role,
    pub last_read_message_id: Option<i64>,
    pub muted: bool,
    pub joined_at: DateTime<Utc>,
}

/// Member row joined with the user's identity, for member lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberProfile {
    #[serde(flatten)]
    pub member: ChatMember,
    pub username: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

/// A chat together with its member list, as returned by `GET /chats/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatDetails {
    #[serde(flatten)]
    pub chat: Chat,
    pub members: Vec<MemberProfile>,
}

// -- Messages --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    System,
    /// Only ever produced by the read-side view of a soft-deleted message.
    Deleted,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::System => "system",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for MessageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "system" => Ok(Self::System),
            "deleted" => Ok(Self::Deleted),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentType {
    Image,
    Video,
    Pdf,
    File,
}

impl AttachmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Pdf => "pdf",
            Self::File => "file",
        }
    }
}

impl FromStr for AttachmentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "pdf" => Ok(Self::Pdf),
            "file" => Ok(Self::File),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub message_id: i64,
    #[serde(rename = "type")]
    pub attachment_type: AttachmentType,
    pub url: String,
    pub filename: Option<String>,
    pub size: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A message as it crosses the storage boundary. Soft-deleted messages are
/// tombstones: `message_type` is `Deleted`, `content` is `None` and
/// `attachments` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: Option<i64>,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub reply_to_id: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub edited_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_coercion_defaults_to_member() {
        for raw in ["superadmin", "", "   ", "moderator", "owners"] {
            assert_eq!(Role::coerce(raw), Role::Member, "input {:?}", raw);
        }
    }

    #[test]
    fn role_coercion_normalizes_case_and_whitespace() {
        assert_eq!(Role::coerce(" Member "), Role::Member);
        assert_eq!(Role::coerce("ADMIN"), Role::Admin);
        assert_eq!(Role::coerce("\towner\n"), Role::Owner);
    }

    #[test]
    fn strict_role_parse_rejects_unnormalized_input() {
        assert!("Admin".parse::<Role>().is_err());
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
    }

    #[test]
    fn only_owner_and_admin_manage() {
        assert!(Role::Owner.can_manage());
        assert!(Role::Admin.can_manage());
        assert!(!Role::Member.can_manage());
    }

    #[test]
    fn message_serializes_type_field() {
        let msg = Message {
            id: 7,
            chat_id: 1,
            sender_id: None,
            message_type: MessageType::System,
            content: Some("alice joined".into()),
            reply_to_id: None,
            deleted_at: None,
            edited_at: None,
            created_at: DateTime::<Utc>::default(),
            attachments: vec![],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "system");
        assert!(json["sender_id"].is_null());
    }
}
