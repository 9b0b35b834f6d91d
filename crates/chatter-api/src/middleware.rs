use std::collections::HashMap;

use axum::{
    Extension,
    extract::{Path, Request, State},
    http::{HeaderValue, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use chatter_db::DbError;
use chatter_types::models::{Message, Role, User};

use crate::error::{ApiError, DbResultExt};
use crate::validation::parse_id;
use crate::{AppState, run_db};

/// The user owning the bearer token of the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Set by `require_membership`: the chat from the path and the caller's role in it.
#[derive(Debug, Clone, Copy)]
pub struct ChatAccess {
    pub chat_id: i64,
    pub role: Role,
}

/// Set by `require_message_access`: the message from the path and the
/// caller's role in the chat it belongs to.
#[derive(Debug, Clone)]
pub struct MessageAccess {
    pub message: Message,
    pub role: Role,
}

/// Resolve `Authorization: Bearer <token>` to a user.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

    let token = bearer_token(auth_header)
        .ok_or_else(|| ApiError::unauthorized("invalid authorization header"))?
        .to_string();

    let user = run_db(&state, move |db| Ok(db.resolve_token(&token)?))
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired token"))?;

    req.extensions_mut().insert(CurrentUser(user));
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("authorization"));
    Ok(response)
}

/// Exactly two space-separated parts, the first being `Bearer`.
fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let value = value.to_str().ok()?;
    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) if !token.is_empty() => Some(token),
        _ => None,
    }
}

/// Gate for `/chats/{chat_id}/...`. Runs after `require_auth`.
pub async fn require_membership(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = params.get("chat_id").map(String::as_str).unwrap_or_default();
    let chat_id = parse_id(raw, "chat id")?;

    let user_id = user.id;
    let role = run_db(&state, move |db| match db.role_of(chat_id, user_id) {
        Ok(role) => Ok(role),
        Err(DbError::NotFound) => Err(ApiError::forbidden("you are not a member of this chat")),
        Err(e) => Err(e.into()),
    })
    .await?;

    debug!("User {} has role {} in chat {}", user_id, role, chat_id);
    req.extensions_mut().insert(ChatAccess { chat_id, role });
    Ok(next.run(req).await)
}

/// Gate for `/messages/{message_id}`. Runs after `require_auth`.
pub async fn require_message_access(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(params): Path<HashMap<String, String>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let raw = params.get("message_id").map(String::as_str).unwrap_or_default();
    let message_id = parse_id(raw, "message id")?;

    let user_id = user.id;
    let access = run_db(&state, move |db| {
        let message = db.get_message(message_id).or_not_found("message not found")?;
        match db.role_of(message.chat_id, user_id) {
            Ok(role) => Ok(MessageAccess { message, role }),
            Err(DbError::NotFound) => Err(ApiError::forbidden("access denied")),
            Err(e) => Err(e.into()),
        }
    })
    .await?;

    req.extensions_mut().insert(access);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Option<String> {
        bearer_token(&HeaderValue::from_str(raw).unwrap()).map(str::to_string)
    }

    #[test]
    fn bearer_header_must_have_exactly_two_parts() {
        assert_eq!(parse("Bearer abc").as_deref(), Some("abc"));
        assert_eq!(parse("Bearer"), None);
        assert_eq!(parse("Bearer "), None);
        assert_eq!(parse("bearer abc"), None);
        assert_eq!(parse("Basic abc"), None);
        assert_eq!(parse("Bearer abc def"), None);
        assert_eq!(parse("abc"), None);
    }
}
