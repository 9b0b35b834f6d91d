//! `impl Database` blocks, one file per component.

mod chats;
mod members;
mod messages;
mod tokens;
mod users;

#[cfg(test)]
pub(crate) mod test_support {
    use chatter_types::models::User;

    use crate::Database;
    use crate::models::NewUser;

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// Users created here carry a dummy hash; password checks are not
    /// exercised at this layer.
    pub fn user(db: &Database, name: &str) -> User {
        db.create_user(&NewUser {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "$argon2id$dummy".to_string(),
            bio: None,
            avatar_url: None,
        })
        .unwrap()
    }
}
