use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                bio             TEXT,
                avatar_url      TEXT,
                last_seen_at    TEXT,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE tokens (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                token_hash  TEXT NOT NULL UNIQUE,
                expires_at  TEXT NOT NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_tokens_user ON tokens(user_id);

            CREATE TABLE chats (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                is_group         INTEGER NOT NULL DEFAULT 0,
                name             TEXT,
                created_by       INTEGER NOT NULL REFERENCES users(id),
                last_message_at  TEXT,
                created_at       TEXT NOT NULL,
                updated_at       TEXT NOT NULL
            );

            CREATE TABLE chat_members (
                chat_id               INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                user_id               INTEGER NOT NULL REFERENCES users(id),
                role                  TEXT NOT NULL CHECK (role IN ('owner', 'admin', 'member')),
                last_read_message_id  INTEGER,
                muted                 INTEGER NOT NULL DEFAULT 0,
                joined_at             TEXT NOT NULL,
                PRIMARY KEY (chat_id, user_id)
            );

            CREATE INDEX idx_chat_members_user ON chat_members(user_id);

            -- AUTOINCREMENT keeps ids strictly increasing; unread counts rely on it.
            CREATE TABLE messages (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id      INTEGER NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
                sender_id    INTEGER REFERENCES users(id),
                type         TEXT NOT NULL CHECK (type IN ('text', 'system')),
                content      TEXT,
                reply_to_id  INTEGER REFERENCES messages(id) ON DELETE SET NULL,
                deleted_at   TEXT,
                edited_at    TEXT,
                created_at   TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, id);

            CREATE TABLE message_attachments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
                type        TEXT NOT NULL CHECK (type IN ('image', 'video', 'pdf', 'file')),
                url         TEXT NOT NULL,
                filename    TEXT,
                size        INTEGER,
                metadata    TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_attachments_message ON message_attachments(message_id);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
