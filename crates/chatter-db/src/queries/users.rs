use chrono::Utc;
use rusqlite::{Connection, Row};

use chatter_types::models::User;

use crate::models::{NewUser, ProfileUpdate, UserRow};
use crate::{Database, DbError, Result};

const USER_COLUMNS: &str =
    "id, username, email, password_hash, bio, avatar_url, last_seen_at, created_at, updated_at";

impl Database {
    pub fn create_user(&self, new: &NewUser) -> Result<User> {
        self.with_conn_mut(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO users (username, email, password_hash, bio, avatar_url, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                rusqlite::params![
                    new.username,
                    new.email,
                    new.password_hash,
                    new.bio,
                    new.avatar_url,
                    now
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(query_user_by_id(conn, id)?.into_user())
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<User> {
        self.with_conn(|conn| Ok(query_user_by_id(conn, id)?.into_user()))
    }

    /// Full row including the password hash, for credential checks.
    pub fn get_user_by_username(&self, username: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
            Ok(conn.query_row(&sql, [username], user_from_row)?)
        })
    }

    pub fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<User> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET username = ?2, email = ?3, bio = ?4, avatar_url = ?5, updated_at = ?6
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.username,
                    update.email,
                    update.bio,
                    update.avatar_url,
                    Utc::now()
                ],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            Ok(query_user_by_id(conn, id)?.into_user())
        })
    }

    /// Replace the password hash and revoke every token of the user in one
    /// transaction: either both happen or neither does.
    pub fn update_password(&self, id: i64, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let changed = tx.execute(
                "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![id, password_hash, Utc::now()],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound);
            }
            super::tokens::delete_tokens_for_user(&tx, id)?;

            tx.commit()?;
            Ok(())
        })
    }

    /// Move `last_seen_at` forward to now. Never moves it backwards, so
    /// concurrent or retried touches commute.
    pub fn touch_last_seen(&self, id: i64) -> Result<User> {
        self.with_conn_mut(|conn| {
            let now = Utc::now();
            conn.execute(
                "UPDATE users SET last_seen_at = ?2
                 WHERE id = ?1 AND (last_seen_at IS NULL OR last_seen_at < ?2)",
                rusqlite::params![id, now],
            )?;
            Ok(query_user_by_id(conn, id)?.into_user())
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<UserRow> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], user_from_row)?)
}

pub(crate) fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        last_seen_at: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
