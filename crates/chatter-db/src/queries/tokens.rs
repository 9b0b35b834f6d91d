use chrono::{Duration, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use chatter_crypto::token::{generate_token, hash_token};
use chatter_types::api::AuthToken;
use chatter_types::models::User;

use super::users::user_from_row;
use crate::{Database, Result};

impl Database {
    /// Create a token for `user_id`. The returned plaintext is the only copy;
    /// the table holds its SHA-256 digest. The user's expired tokens are
    /// pruned in the same transaction.
    pub fn issue_token(&self, user_id: i64, ttl: Duration) -> Result<AuthToken> {
        let token = generate_token()?;
        let token_hash = hash_token(&token);
        let now = Utc::now();
        let expires_at = now + ttl;

        let pruned = self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let pruned = tx.execute(
                "DELETE FROM tokens WHERE user_id = ?1 AND expires_at <= ?2",
                rusqlite::params![user_id, now],
            )?;
            tx.execute(
                "INSERT INTO tokens (user_id, token_hash, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, token_hash, expires_at, now],
            )?;
            tx.commit()?;
            Ok(pruned)
        })?;

        debug!(
            "Issued token for user {} (expires {}, pruned {} expired)",
            user_id, expires_at, pruned
        );
        Ok(AuthToken { token, expires_at })
    }

    /// Owner of a live token. Unknown and expired tokens both give `None`.
    pub fn resolve_token(&self, plaintext: &str) -> Result<Option<User>> {
        let token_hash = hash_token(plaintext);

        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT u.id, u.username, u.email, u.password_hash, u.bio, u.avatar_url,
                            u.last_seen_at, u.created_at, u.updated_at
                     FROM users u
                     INNER JOIN tokens t ON t.user_id = u.id
                     WHERE t.token_hash = ?1 AND t.expires_at > ?2",
                    rusqlite::params![token_hash, Utc::now()],
                    user_from_row,
                )
                .optional()?;
            Ok(row.map(|r| r.into_user()))
        })
    }

    pub fn revoke_all_tokens(&self, user_id: i64) -> Result<usize> {
        self.with_conn_mut(|conn| delete_tokens_for_user(conn, user_id))
    }
}

/// Shared with the password-update transaction.
pub(crate) fn delete_tokens_for_user(conn: &Connection, user_id: i64) -> Result<usize> {
    Ok(conn.execute("DELETE FROM tokens WHERE user_id = ?1", [user_id])?)
}
