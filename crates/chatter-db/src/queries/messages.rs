use std::collections::HashMap;

use chrono::Utc;
use rusqlite::{Connection, Row};

use chatter_types::models::{Attachment, Message};

use super::members::advance_cursor;
use crate::models::{AttachmentRow, MessageRow, NewMessage};
use crate::{Database, DbError, Result};

const MESSAGE_COLUMNS: &str =
    "id, chat_id, sender_id, type, content, reply_to_id, deleted_at, edited_at, created_at";

impl Database {
    /// Insert a message with its attachments, bump the chat's activity
    /// timestamp and move the sender's read cursor past their own message,
    /// all in one transaction.
    pub fn create_message(&self, new: &NewMessage) -> Result<Message> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now();

            tx.execute(
                "INSERT INTO messages (chat_id, sender_id, type, content, reply_to_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.chat_id,
                    new.sender_id,
                    new.message_type.as_str(),
                    new.content,
                    new.reply_to_id,
                    now
                ],
            )?;
            let message_id = tx.last_insert_rowid();

            for attachment in &new.attachments {
                // Missing metadata is stored as an empty object, never NULL.
                let metadata = attachment
                    .metadata
                    .as_ref()
                    .filter(|m| !m.is_null())
                    .map_or_else(|| "{}".to_string(), |m| m.to_string());

                tx.execute(
                    "INSERT INTO message_attachments (message_id, type, url, filename, size, metadata, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        message_id,
                        attachment.attachment_type.as_str(),
                        attachment.url,
                        attachment.filename,
                        attachment.size,
                        metadata,
                        now
                    ],
                )?;
            }

            tx.execute(
                "UPDATE chats SET last_message_at = ?2 WHERE id = ?1",
                rusqlite::params![new.chat_id, now],
            )?;

            if let Some(sender_id) = new.sender_id {
                advance_cursor(&tx, new.chat_id, sender_id, message_id)?;
            }

            let message = load_message(&tx, message_id)?;
            tx.commit()?;
            Ok(message)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Message> {
        self.with_conn(|conn| load_message(conn, id))
    }

    /// A page of a chat's messages, newest first. Attachments for the whole
    /// page come from one batched query.
    pub fn list_messages(&self, chat_id: i64, limit: u32, offset: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE chat_id = ?1
                 ORDER BY id DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![chat_id, limit, offset], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            // Tombstones never show attachments, so don't fetch them.
            let visible_ids: Vec<i64> = rows
                .iter()
                .filter(|r| r.deleted_at.is_none())
                .map(|r| r.id)
                .collect();

            let mut by_message: HashMap<i64, Vec<Attachment>> = HashMap::new();
            for row in query_attachments(conn, &visible_ids)? {
                let attachment = row.into_attachment()?;
                by_message.entry(attachment.message_id).or_default().push(attachment);
            }

            rows.into_iter()
                .map(|row| {
                    let attachments = by_message.remove(&row.id).unwrap_or_default();
                    row.into_message(attachments)
                })
                .collect()
        })
    }

    /// Edit the content of a visible message. Missing and soft-deleted
    /// messages both yield `NotFound`. Whether the caller may edit is decided
    /// by the caller.
    pub fn update_message(&self, id: i64, content: &str) -> Result<Message> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET content = ?2, edited_at = ?3
                 WHERE id = ?1 AND deleted_at IS NULL",
                rusqlite::params![id, content, Utc::now()],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            load_message(conn, id)
        })
    }

    /// Mark a message deleted. The row and its attachments stay in storage;
    /// the first deletion timestamp wins.
    pub fn soft_delete_message(&self, id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET deleted_at = COALESCE(deleted_at, ?2) WHERE id = ?1",
                rusqlite::params![id, Utc::now()],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    /// Messages in the chat with an id past the user's read cursor (unset
    /// counts as 0). Ids are AUTOINCREMENT, so id order is insertion order.
    pub fn unread_count(&self, chat_id: i64, user_id: i64) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE chat_id = ?1
                   AND id > COALESCE(
                       (SELECT last_read_message_id FROM chat_members
                        WHERE chat_id = ?1 AND user_id = ?2),
                       0)",
                [chat_id, user_id],
                |r| r.get(0),
            )?)
        })
    }
}

fn load_message(conn: &Connection, id: i64) -> Result<Message> {
    let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
    let row = conn.query_row(&sql, [id], message_from_row)?;

    let attachments = if row.deleted_at.is_some() {
        Vec::new()
    } else {
        query_attachments(conn, &[id])?
            .into_iter()
            .map(AttachmentRow::into_attachment)
            .collect::<Result<Vec<_>>>()?
    };

    row.into_message(attachments)
}

/// Batch-fetch attachments for a set of message IDs.
fn query_attachments(conn: &Connection, message_ids: &[i64]) -> Result<Vec<AttachmentRow>> {
    if message_ids.is_empty() {
        return Ok(vec![]);
    }

    let placeholders: Vec<String> = (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT id, message_id, type, url, filename, size, metadata, created_at
         FROM message_attachments
         WHERE message_id IN ({})
         ORDER BY id",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(message_ids), |row| {
            Ok(AttachmentRow {
                id: row.get(0)?,
                message_id: row.get(1)?,
                attachment_type: row.get(2)?,
                url: row.get(3)?,
                filename: row.get(4)?,
                size: row.get(5)?,
                metadata: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        message_type: row.get(3)?,
        content: row.get(4)?,
        reply_to_id: row.get(5)?,
        deleted_at: row.get(6)?,
        edited_at: row.get(7)?,
        created_at: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewChat;
    use crate::queries::test_support::{db, user};
    use chatter_types::api::NewAttachment;
    use chatter_types::models::{AttachmentType, MessageType};

    fn setup() -> (Database, i64, i64) {
        let db = db();
        let alice = user(&db, "alice");
        let chat = db
            .create_chat(
                &NewChat {
                    is_group: false,
                    name: None,
                },
                alice.id,
            )
            .unwrap();
        (db, chat.id, alice.id)
    }

    fn text(chat_id: i64, sender: i64, content: &str) -> NewMessage {
        NewMessage {
            chat_id,
            sender_id: Some(sender),
            message_type: MessageType::Text,
            content: Some(content.to_string()),
            reply_to_id: None,
            attachments: vec![],
        }
    }

    fn image(metadata: Option<serde_json::Value>) -> NewAttachment {
        NewAttachment {
            attachment_type: AttachmentType::Image,
            url: "https://cdn.example/p.png".into(),
            filename: Some("p.png".into()),
            size: Some(2048),
            metadata,
        }
    }

    #[test]
    fn create_assigns_increasing_ids_and_bumps_chat() {
        let (db, chat_id, alice) = setup();
        let m1 = db.create_message(&text(chat_id, alice, "one")).unwrap();
        let m2 = db.create_message(&text(chat_id, alice, "two")).unwrap();

        assert!(m2.id > m1.id);
        assert_eq!(m2.message_type, MessageType::Text);
        assert_eq!(db.get_chat(chat_id).unwrap().last_message_at, Some(m2.created_at));
    }

    #[test]
    fn attachments_default_metadata_to_empty_object() {
        let (db, chat_id, alice) = setup();
        let mut new = text(chat_id, alice, "look");
        new.attachments = vec![image(None), image(Some(serde_json::json!({"w": 640})))];

        let msg = db.create_message(&new).unwrap();
        assert_eq!(msg.attachments.len(), 2);
        assert_eq!(msg.attachments[0].metadata, serde_json::json!({}));
        assert_eq!(msg.attachments[1].metadata["w"], 640);

        let fetched = db.get_message(msg.id).unwrap();
        assert_eq!(fetched, msg);
    }

    #[test]
    fn failed_message_insert_leaves_nothing_behind() {
        let (db, _chat_id, alice) = setup();
        // Unknown chat: the insert fails and the transaction rolls back.
        let err = db.create_message(&text(999, alice, "lost")).unwrap_err();
        assert!(matches!(err, DbError::InvalidReference(_)));

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn list_is_newest_first_and_paged() {
        let (db, chat_id, alice) = setup();
        let ids: Vec<i64> = (0..5)
            .map(|i| db.create_message(&text(chat_id, alice, &format!("m{i}"))).unwrap().id)
            .collect();

        let page = db.list_messages(chat_id, 2, 0).unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);

        let page = db.list_messages(chat_id, 2, 4).unwrap();
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[0]]);
    }

    #[test]
    fn list_joins_attachments_per_message() {
        let (db, chat_id, alice) = setup();
        let mut with = text(chat_id, alice, "pic");
        with.attachments = vec![image(None)];
        let a = db.create_message(&with).unwrap();
        let b = db.create_message(&text(chat_id, alice, "plain")).unwrap();

        let page = db.list_messages(chat_id, 10, 0).unwrap();
        assert_eq!(page[0].id, b.id);
        assert!(page[0].attachments.is_empty());
        assert_eq!(page[1].id, a.id);
        assert_eq!(page[1].attachments.len(), 1);
    }

    #[test]
    fn soft_delete_masks_every_read_path() {
        let (db, chat_id, alice) = setup();
        let mut new = text(chat_id, alice, "regret");
        new.attachments = vec![image(None)];
        let msg = db.create_message(&new).unwrap();

        db.soft_delete_message(msg.id).unwrap();

        let fetched = db.get_message(msg.id).unwrap();
        assert_eq!(fetched.message_type, MessageType::Deleted);
        assert!(fetched.content.is_none());
        assert!(fetched.attachments.is_empty());
        assert!(fetched.is_deleted());

        let listed = &db.list_messages(chat_id, 10, 0).unwrap()[0];
        assert_eq!(listed.message_type, MessageType::Deleted);
        assert!(listed.content.is_none());
        assert!(listed.attachments.is_empty());

        // Still physically present.
        let (content, attachments): (Option<String>, i64) = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT m.content, (SELECT COUNT(*) FROM message_attachments WHERE message_id = m.id)
                     FROM messages m WHERE m.id = ?1",
                    [msg.id],
                    |r| Ok((r.get(0)?, r.get(1)?)),
                )?)
            })
            .unwrap();
        assert_eq!(content.as_deref(), Some("regret"));
        assert_eq!(attachments, 1);
    }

    #[test]
    fn soft_delete_keeps_first_timestamp() {
        let (db, chat_id, alice) = setup();
        let msg = db.create_message(&text(chat_id, alice, "x")).unwrap();

        db.soft_delete_message(msg.id).unwrap();
        let first = db.get_message(msg.id).unwrap().deleted_at;
        db.soft_delete_message(msg.id).unwrap();
        assert_eq!(db.get_message(msg.id).unwrap().deleted_at, first);

        assert!(matches!(db.soft_delete_message(12345), Err(DbError::NotFound)));
    }

    #[test]
    fn update_sets_content_and_edited_at() {
        let (db, chat_id, alice) = setup();
        let msg = db.create_message(&text(chat_id, alice, "teh")).unwrap();
        assert!(msg.edited_at.is_none());

        let edited = db.update_message(msg.id, "the").unwrap();
        assert_eq!(edited.content.as_deref(), Some("the"));
        assert!(edited.edited_at.is_some());
    }

    #[test]
    fn update_of_deleted_or_missing_is_not_found() {
        let (db, chat_id, alice) = setup();
        let msg = db.create_message(&text(chat_id, alice, "gone")).unwrap();
        db.soft_delete_message(msg.id).unwrap();

        assert!(matches!(db.update_message(msg.id, "back"), Err(DbError::NotFound)));
        assert!(matches!(db.update_message(777, "nope"), Err(DbError::NotFound)));
    }

    #[test]
    fn unread_count_follows_cursor() {
        let (db, chat_id, alice) = setup();
        let bob = user(&db, "bob");

        let m1 = db.create_message(&text(chat_id, alice, "hello")).unwrap();
        // The sender has read their own message.
        assert_eq!(db.unread_count(chat_id, alice).unwrap(), 0);

        db.add_member(chat_id, bob.id, "member").unwrap();
        assert_eq!(db.unread_count(chat_id, bob.id).unwrap(), 1);

        db.advance_last_read(chat_id, bob.id, m1.id).unwrap();
        assert_eq!(db.unread_count(chat_id, bob.id).unwrap(), 0);

        db.create_message(&text(chat_id, alice, "again")).unwrap();
        assert_eq!(db.unread_count(chat_id, bob.id).unwrap(), 1);
    }

    #[test]
    fn system_message_has_no_sender() {
        let (db, chat_id, _alice) = setup();
        let msg = db
            .create_message(&NewMessage {
                chat_id,
                sender_id: None,
                message_type: MessageType::System,
                content: Some("chat created".into()),
                reply_to_id: None,
                attachments: vec![],
            })
            .unwrap();
        assert_eq!(msg.message_type, MessageType::System);
        assert!(msg.sender_id.is_none());
    }
}
