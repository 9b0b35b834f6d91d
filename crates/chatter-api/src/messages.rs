use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::{debug, info};

use chatter_db::DbError;
use chatter_db::models::NewMessage;
use chatter_types::api::{EditMessageRequest, SendMessageRequest};
use chatter_types::models::MessageType;

use crate::error::{ApiError, DbResultExt, JsonBody};
use crate::middleware::{ChatAccess, CurrentUser, MessageAccess};
use crate::validation::{normalize_content, parse_page};
use crate::{AppState, run_db};

pub async fn send_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
    JsonBody(req): JsonBody<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // System messages are written by the server, never posted by clients.
    if req.message_type != MessageType::Text {
        return Err(ApiError::validation("only text messages can be sent"));
    }
    let content = normalize_content(req.content.as_deref())?;
    if content.is_none() && req.attachments.is_empty() {
        return Err(ApiError::validation("message must have content or attachments"));
    }
    if req.attachments.iter().any(|a| a.url.trim().is_empty()) {
        return Err(ApiError::validation("attachment url cannot be empty"));
    }

    let new = NewMessage {
        chat_id: access.chat_id,
        sender_id: Some(user.id),
        message_type: MessageType::Text,
        content,
        reply_to_id: req.reply_to_id,
        attachments: req.attachments,
    };

    let message = run_db(&state, move |db| {
        if let Some(reply_to) = new.reply_to_id {
            match db.get_message(reply_to) {
                Ok(target) if target.chat_id == new.chat_id => {}
                Ok(_) | Err(DbError::NotFound) => {
                    return Err(ApiError::validation("reply_to_id must reference a message in this chat"));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(db.create_message(&new)?)
    })
    .await?;

    debug!("User {} posted message {} in chat {}", user.id, message.id, message.chat_id);
    Ok((StatusCode::CREATED, Json(json!({ "message": message }))))
}

/// A page of the chat's messages, newest first.
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
    Path((_, raw_offset, raw_limit)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let (offset, limit) = parse_page(&raw_offset, &raw_limit)?;

    let chat_id = access.chat_id;
    let messages = run_db(&state, move |db| Ok(db.list_messages(chat_id, limit, offset)?)).await?;

    Ok(Json(json!({ "messages": messages })))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = access.chat_id;
    let user_id = user.id;
    let count = run_db(&state, move |db| Ok(db.unread_count(chat_id, user_id)?)).await?;

    Ok(Json(json!({ "count": count })))
}

pub async fn get_message(Extension(access): Extension<MessageAccess>) -> impl IntoResponse {
    Json(json!({ "message": access.message }))
}

/// Only the sender may edit, and only while the message is visible.
pub async fn edit_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<MessageAccess>,
    JsonBody(req): JsonBody<EditMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if access.message.sender_id != Some(user.id) {
        return Err(ApiError::forbidden("you can only edit your own messages"));
    }
    if access.message.is_deleted() {
        return Err(ApiError::not_found("message not found or already deleted"));
    }
    let content = normalize_content(Some(&req.content))?
        .ok_or_else(|| ApiError::validation("content cannot be empty"))?;

    let message_id = access.message.id;
    let message = run_db(&state, move |db| {
        db.update_message(message_id, &content)
            .or_not_found("message not found or already deleted")
    })
    .await?;

    Ok(Json(json!({ "message": message })))
}

/// Soft delete. Allowed for the sender and for chat owners and admins.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<MessageAccess>,
) -> Result<impl IntoResponse, ApiError> {
    let is_sender = access.message.sender_id == Some(user.id);
    if !is_sender && !access.role.can_manage() {
        return Err(ApiError::forbidden("you cannot delete this message"));
    }

    let message_id = access.message.id;
    run_db(&state, move |db| {
        db.soft_delete_message(message_id).or_not_found("message not found")
    })
    .await?;

    info!("Message {} deleted by user {}", message_id, user.id);
    Ok(StatusCode::NO_CONTENT)
}
