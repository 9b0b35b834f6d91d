use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row};

use chatter_types::models::{ChatMember, MemberProfile, Role};

use crate::{Database, DbError, Result};

const MEMBER_COLUMNS: &str = "cm.chat_id, cm.user_id, cm.role, cm.last_read_message_id, cm.muted, cm.joined_at";

impl Database {
    /// `role` is untrusted input; it is coerced to a known role rather than
    /// rejected. A duplicate (chat, user) pair is a `Conflict`.
    pub fn add_member(&self, chat_id: i64, user_id: i64, role: &str) -> Result<ChatMember> {
        let role = Role::coerce(role);

        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chat_members (chat_id, user_id, role, muted, joined_at)
                 VALUES (?1, ?2, ?3, 0, ?4)",
                rusqlite::params![chat_id, user_id, role.as_str(), Utc::now()],
            )?;
            query_member(conn, chat_id, user_id)
        })
    }

    pub fn remove_member(&self, chat_id: i64, user_id: i64) -> Result<()> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "DELETE FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                [chat_id, user_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            Ok(())
        })
    }

    /// Absence is `Ok(false)`, never an error.
    pub fn is_member(&self, chat_id: i64, user_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM chat_members WHERE chat_id = ?1 AND user_id = ?2",
                    [chat_id, user_id],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn role_of(&self, chat_id: i64, user_id: i64) -> Result<Role> {
        self.get_member(chat_id, user_id).map(|m| m.role)
    }

    pub fn get_member(&self, chat_id: i64, user_id: i64) -> Result<ChatMember> {
        self.with_conn(|conn| query_member(conn, chat_id, user_id))
    }

    /// Move the read cursor forward to `message_id`. A value at or behind the
    /// stored cursor is a no-op, so retries in any order converge on the max.
    /// Returns the cursor as stored afterwards.
    pub fn advance_last_read(&self, chat_id: i64, user_id: i64, message_id: i64) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            advance_cursor(conn, chat_id, user_id, message_id)?;
            Ok(query_member(conn, chat_id, user_id)?.last_read_message_id)
        })
    }

    pub fn set_muted(&self, chat_id: i64, user_id: i64, muted: bool) -> Result<ChatMember> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE chat_members SET muted = ?3 WHERE chat_id = ?1 AND user_id = ?2",
                rusqlite::params![chat_id, user_id, muted],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            query_member(conn, chat_id, user_id)
        })
    }

    /// Members with their user identity, newest-joined first.
    pub fn list_members(&self, chat_id: i64) -> Result<Vec<MemberProfile>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMBER_COLUMNS}, u.username, u.email, u.avatar_url
                 FROM chat_members cm
                 INNER JOIN users u ON u.id = cm.user_id
                 WHERE cm.chat_id = ?1
                 ORDER BY cm.joined_at DESC, cm.rowid DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat_id], |row| {
                    Ok((
                        member_columns(row)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<String>>(8)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(raw, username, email, avatar_url)| {
                    Ok(MemberProfile {
                        member: raw.into_member()?,
                        username,
                        email,
                        avatar_url,
                    })
                })
                .collect()
        })
    }
}

/// Conditional cursor update, shared with message creation.
pub(crate) fn advance_cursor(conn: &Connection, chat_id: i64, user_id: i64, message_id: i64) -> Result<usize> {
    Ok(conn.execute(
        "UPDATE chat_members SET last_read_message_id = ?3
         WHERE chat_id = ?1 AND user_id = ?2
           AND (last_read_message_id IS NULL OR last_read_message_id < ?3)",
        [chat_id, user_id, message_id],
    )?)
}

fn query_member(conn: &Connection, chat_id: i64, user_id: i64) -> Result<ChatMember> {
    let sql = format!("SELECT {MEMBER_COLUMNS} FROM chat_members cm WHERE cm.chat_id = ?1 AND cm.user_id = ?2");
    conn.query_row(&sql, [chat_id, user_id], member_columns)?
        .into_member()
}

/// Member row with the role still as stored text.
struct RawMember {
    chat_id: i64,
    user_id: i64,
    role: String,
    last_read_message_id: Option<i64>,
    muted: bool,
    joined_at: chrono::DateTime<Utc>,
}

impl RawMember {
    fn into_member(self) -> Result<ChatMember> {
        let role = self.role.parse().map_err(|e| {
            DbError::Corrupt(format!("member ({}, {}): {}", self.chat_id, self.user_id, e))
        })?;
        Ok(ChatMember {
            chat_id: self.chat_id,
            user_id: self.user_id,
            role,
            last_read_message_id: self.last_read_message_id,
            muted: self.muted,
            joined_at: self.joined_at,
        })
    }
}

fn member_columns(row: &Row<'_>) -> rusqlite::Result<RawMember> {
    Ok(RawMember {
        chat_id: row.get(0)?,
        user_id: row.get(1)?,
        role: row.get(2)?,
        last_read_message_id: row.get(3)?,
        muted: row.get(4)?,
        joined_at: row.get(5)?,
    })
}
