use chrono::Utc;
use rusqlite::{Connection, Row};
use tracing::info;

use chatter_types::models::{Chat, Role};

use crate::models::NewChat;
use crate::{Database, DbError, Result};

const CHAT_COLUMNS: &str =
    "c.id, c.is_group, c.name, c.created_by, c.last_message_at, c.created_at, c.updated_at";

impl Database {
    /// Insert the chat and its creator's owner membership in one transaction.
    /// A chat is never visible without its creator as a member.
    pub fn create_chat(&self, new: &NewChat, creator_id: i64) -> Result<Chat> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now();

            tx.execute(
                "INSERT INTO chats (is_group, name, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![new.is_group, new.name, creator_id, now],
            )?;
            let chat_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO chat_members (chat_id, user_id, role, muted, joined_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                rusqlite::params![chat_id, creator_id, Role::Owner.as_str(), now],
            )?;

            let chat = query_chat(&tx, chat_id)?;
            tx.commit()?;

            info!("Chat {} created by user {}", chat_id, creator_id);
            Ok(chat)
        })
    }

    pub fn get_chat(&self, chat_id: i64) -> Result<Chat> {
        self.with_conn(|conn| query_chat(conn, chat_id))
    }

    /// Chats the user belongs to, most recent activity first. Chats without
    /// messages sort last.
    pub fn list_chats_for_user(&self, user_id: i64) -> Result<Vec<Chat>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {CHAT_COLUMNS}
                 FROM chats c
                 INNER JOIN chat_members cm ON c.id = cm.chat_id
                 WHERE cm.user_id = ?1
                 ORDER BY c.last_message_at DESC NULLS LAST, c.id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let chats = stmt
                .query_map([user_id], chat_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(chats)
        })
    }

    /// Rename a chat. Membership is untouched.
    pub fn update_chat(&self, chat_id: i64, name: Option<&str>) -> Result<Chat> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chats SET name = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![chat_id, name, Utc::now()],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            query_chat(conn, chat_id)
        })
    }

    /// Hard delete; members, messages and attachments cascade.
    pub fn delete_chat(&self, chat_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute("DELETE FROM chats WHERE id = ?1", [chat_id])?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            info!("Chat {} deleted", chat_id);
            Ok(())
        })
    }
}

fn query_chat(conn: &Connection, chat_id: i64) -> Result<Chat> {
    let sql = format!("SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = ?1");
    Ok(conn.query_row(&sql, [chat_id], chat_from_row)?)
}

fn chat_from_row(row: &Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        is_group: row.get(1)?,
        name: row.get(2)?,
        created_by: row.get(3)?,
        last_message_at: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewMessage;
    use crate::queries::test_support::{db, user};
    use chatter_types::models::MessageType;

    fn group(name: &str) -> NewChat {
        NewChat {
            is_group: true,
            name: Some(name.to_string()),
        }
    }

    fn post(db: &Database, chat_id: i64, sender: i64) {
        db.create_message(&NewMessage {
            chat_id,
            sender_id: Some(sender),
            message_type: MessageType::Text,
            content: Some("hi".into()),
            reply_to_id: None,
            attachments: vec![],
        })
        .unwrap();
    }

    #[test]
    fn creator_is_owner_immediately() {
        let db = db();
        let alice = user(&db, "alice");

        let chat = db.create_chat(&group("book club"), alice.id).unwrap();
        assert_eq!(chat.created_by, alice.id);
        assert!(chat.last_message_at.is_none());

        assert!(db.is_member(chat.id, alice.id).unwrap());
        assert_eq!(db.role_of(chat.id, alice.id).unwrap(), Role::Owner);
        let members = db.list_members(chat.id).unwrap();
        assert_eq!(members.len(), 1);
        assert!(!members[0].member.muted);
    }

    #[test]
    fn failed_bootstrap_rolls_back_chat() {
        let db = db();
        // No such user: a foreign key fails and no chat row may survive.
        let err = db.create_chat(&group("ghost"), 404).unwrap_err();
        assert!(matches!(err, DbError::InvalidReference(_)));

        let count: i64 = db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn list_orders_by_recent_activity_with_idle_chats_last() {
        let db = db();
        let alice = user(&db, "alice");

        let quiet = db.create_chat(&group("quiet"), alice.id).unwrap();
        let older = db.create_chat(&group("older"), alice.id).unwrap();
        let newer = db.create_chat(&group("newer"), alice.id).unwrap();

        post(&db, older.id, alice.id);
        post(&db, newer.id, alice.id);

        let ids: Vec<i64> = db
            .list_chats_for_user(alice.id)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id, quiet.id]);
    }

    #[test]
    fn list_only_includes_member_chats() {
        let db = db();
        let alice = user(&db, "alice");
        let bob = user(&db, "bob");
        db.create_chat(&group("alice only"), alice.id).unwrap();

        assert!(db.list_chats_for_user(bob.id).unwrap().is_empty());
    }

    #[test]
    fn update_renames_without_touching_members() {
        let db = db();
        let alice = user(&db, "alice");
        let chat = db.create_chat(&group("before"), alice.id).unwrap();

        let updated = db.update_chat(chat.id, Some("after")).unwrap();
        assert_eq!(updated.name.as_deref(), Some("after"));
        assert_eq!(db.list_members(chat.id).unwrap().len(), 1);
    }

    #[test]
    fn delete_cascades_and_reports_missing() {
        let db = db();
        let alice = user(&db, "alice");
        let chat = db.create_chat(&group("doomed"), alice.id).unwrap();
        post(&db, chat.id, alice.id);

        db.delete_chat(chat.id).unwrap();
        assert!(matches!(db.get_chat(chat.id), Err(DbError::NotFound)));
        assert!(!db.is_member(chat.id, alice.id).unwrap());
        assert!(matches!(db.delete_chat(chat.id), Err(DbError::NotFound)));
    }
}
