use rusqlite::ffi;

pub type Result<T> = std::result::Result<T, DbError>;

/// Storage failures, classified so callers can tell a miss or a constraint
/// violation apart from a real fault.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("referenced record does not exist: {0}")]
    InvalidReference(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("database lock poisoned: {0}")]
    Poisoned(String),

    #[error(transparent)]
    Crypto(#[from] chatter_crypto::CryptoError),

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::QueryReturnedNoRows => return Self::NotFound,
            rusqlite::Error::SqliteFailure(e, msg) => {
                let detail = msg.clone().unwrap_or_else(|| e.to_string());
                match e.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return Self::Conflict(detail);
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return Self::InvalidReference(detail),
                    _ => {}
                }
            }
            _ => {}
        }
        Self::Sqlite(err)
    }
}
