use std::sync::OnceLock;

use regex::Regex;

use crate::error::ApiError;

pub const MAX_USERNAME_LEN: usize = 50;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_CHAT_NAME_LEN: usize = 100;
pub const MAX_MESSAGE_LEN: usize = 4000;
pub const MAX_PAGE_SIZE: u32 = 200;

/// Trim and lowercase; usernames are stored lowercase.
pub fn validate_username(raw: &str) -> Result<String, ApiError> {
    let username = raw.trim().to_lowercase();
    if username.is_empty() {
        return Err(ApiError::validation("username cannot be empty"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(ApiError::validation(format!(
            "username cannot be longer than {} characters",
            MAX_USERNAME_LEN
        )));
    }
    Ok(username)
}

pub fn validate_email(raw: &str) -> Result<String, ApiError> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("Invalid regex")
    });

    let email = raw.trim();
    if email.is_empty() {
        return Err(ApiError::validation("email is required"));
    }
    if !re.is_match(email) {
        return Err(ApiError::validation("invalid email format"));
    }
    Ok(email.to_string())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::validation("password cannot be empty"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Group chats need a name; direct chats never keep one.
pub fn validate_chat_name(is_group: bool, raw: Option<&str>) -> Result<Option<String>, ApiError> {
    if !is_group {
        return Ok(None);
    }
    let name = raw.map(str::trim).unwrap_or_default();
    if name.is_empty() {
        return Err(ApiError::validation("group chats require a name"));
    }
    if name.chars().count() > MAX_CHAT_NAME_LEN {
        return Err(ApiError::validation(format!(
            "chat name cannot be longer than {} characters",
            MAX_CHAT_NAME_LEN
        )));
    }
    Ok(Some(name.to_string()))
}

/// Empty or whitespace-only content becomes `None`.
pub fn normalize_content(raw: Option<&str>) -> Result<Option<String>, ApiError> {
    let Some(content) = raw.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    if content.chars().count() > MAX_MESSAGE_LEN {
        return Err(ApiError::validation(format!(
            "message cannot be longer than {} characters",
            MAX_MESSAGE_LEN
        )));
    }
    Ok(Some(content.to_string()))
}

/// Positive integer id from a path segment.
pub fn parse_id(raw: &str, what: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::validation(format!("invalid {}", what))),
    }
}

pub fn parse_page(offset: &str, limit: &str) -> Result<(u32, u32), ApiError> {
    let offset = offset
        .parse::<u32>()
        .map_err(|_| ApiError::validation("invalid offset"))?;
    let limit = match limit.parse::<u32>() {
        Ok(l) if l > 0 => l.min(MAX_PAGE_SIZE),
        _ => return Err(ApiError::validation("invalid limit")),
    };
    Ok((offset, limit))
}
