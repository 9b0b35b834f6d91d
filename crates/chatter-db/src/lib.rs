pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

pub use error::{DbError, Result};

use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::info;

const READER_POOL_SIZE: usize = 4;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite handle with a reader/writer split: one writer connection behind a
/// mutex (SQLite allows a single writer anyway) and a small round-robin pool
/// of read-only connections. WAL mode lets readers proceed during writes.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;
        writer.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            readers.push(Mutex::new(conn));
        }

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
        })
    }

    /// Private in-memory database. Reads and writes share the one connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        Ok(Self {
            writer: Mutex::new(conn),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            let conn = self
                .writer
                .lock()
                .map_err(|e| DbError::Poisoned(e.to_string()))?;
            return f(&conn);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| DbError::Poisoned(e.to_string()))?;
        f(&conn)
    }

    /// Writer access. `&mut` so callers can open a transaction, which rolls
    /// back on drop unless committed.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| DbError::Poisoned(e.to_string()))?;
        f(&mut conn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewChat, NewUser};

    /// Scratch directory under the system temp dir, removed on drop.
    struct ScratchDir(std::path::PathBuf);

    impl ScratchDir {
        fn new(tag: &str) -> Self {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos();
            let dir = std::env::temp_dir()
                .join(format!("chatter_db_{}_{}_{}", tag, std::process::id(), nanos));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    #[test]
    fn file_database_reads_writes_through_reader_pool() {
        let dir = ScratchDir::new("pool");
        let db = Database::open(&dir.0.join("chatter.db")).unwrap();
        assert_eq!(db.readers.len(), READER_POOL_SIZE);

        let alice = db
            .create_user(&NewUser {
                username: "alice".into(),
                email: "alice@example.com".into(),
                password_hash: "$argon2id$dummy".into(),
                bio: None,
                avatar_url: None,
            })
            .unwrap();
        let chat = db
            .create_chat(
                &NewChat {
                    is_group: true,
                    name: Some("team".into()),
                },
                alice.id,
            )
            .unwrap();
        let token = db.issue_token(alice.id, chrono::Duration::hours(1)).unwrap();

        // Twice round the pool so every reader connection serves a read.
        for _ in 0..READER_POOL_SIZE * 2 {
            let resolved = db.resolve_token(&token.token).unwrap().unwrap();
            assert_eq!(resolved.id, alice.id);
            assert!(db.is_member(chat.id, alice.id).unwrap());
            assert_eq!(db.get_chat(chat.id).unwrap().name.as_deref(), Some("team"));
        }
        assert!(db.reader_idx.load(Ordering::Relaxed) >= READER_POOL_SIZE * 2);
    }

    #[test]
    fn readers_reject_writes() {
        let dir = ScratchDir::new("readonly");
        let db = Database::open(&dir.0.join("chatter.db")).unwrap();

        let err = db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM users", [])?))
            .unwrap_err();
        assert!(matches!(err, DbError::Sqlite(_)));
    }

    #[test]
    fn reopening_keeps_data() {
        let dir = ScratchDir::new("reopen");
        let path = dir.0.join("chatter.db");
        {
            let db = Database::open(&path).unwrap();
            db.create_user(&NewUser {
                username: "bob".into(),
                email: "bob@example.com".into(),
                password_hash: "$argon2id$dummy".into(),
                bio: None,
                avatar_url: None,
            })
            .unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_user_by_username("bob").unwrap().email, "bob@example.com");
    }
}
