use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;

use chatter_db::models::NewChat;
use chatter_types::api::{CreateChatRequest, UpdateChatRequest};
use chatter_types::models::{ChatDetails, Role};

use crate::error::{ApiError, DbResultExt, JsonBody};
use crate::middleware::{ChatAccess, CurrentUser};
use crate::validation::validate_chat_name;
use crate::{AppState, run_db};

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let chats = run_db(&state, move |db| Ok(db.list_chats_for_user(user_id)?)).await?;
    Ok(Json(json!({ "chats": chats })))
}

/// The caller becomes the chat's owner.
pub async fn create_chat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<CreateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new = NewChat {
        is_group: req.is_group,
        name: validate_chat_name(req.is_group, req.name.as_deref())?,
    };

    let user_id = user.id;
    let chat = run_db(&state, move |db| Ok(db.create_chat(&new, user_id)?)).await?;

    Ok((StatusCode::CREATED, Json(json!({ "chat": chat }))))
}

pub async fn get_chat(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = access.chat_id;
    let details = run_db(&state, move |db| {
        let chat = db.get_chat(chat_id).or_not_found("chat not found")?;
        let members = db.list_members(chat_id)?;
        Ok(ChatDetails { chat, members })
    })
    .await?;

    Ok(Json(json!({ "chat": details })))
}

/// Responds with the same shape as `get_chat`.
pub async fn update_chat(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
    JsonBody(req): JsonBody<UpdateChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !access.role.can_manage() {
        return Err(ApiError::forbidden("only owners and admins can update the chat"));
    }

    let chat_id = access.chat_id;
    let details = run_db(&state, move |db| {
        let current = db.get_chat(chat_id).or_not_found("chat not found")?;
        let name = validate_chat_name(current.is_group, req.name.as_deref())?;
        let chat = db
            .update_chat(chat_id, name.as_deref())
            .or_not_found("chat not found")?;
        let members = db.list_members(chat_id)?;
        Ok(ChatDetails { chat, members })
    })
    .await?;

    Ok(Json(json!({ "chat": details })))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
) -> Result<impl IntoResponse, ApiError> {
    if access.role != Role::Owner {
        return Err(ApiError::forbidden("only the owner can delete the chat"));
    }

    let chat_id = access.chat_id;
    run_db(&state, move |db| db.delete_chat(chat_id).or_not_found("chat not found")).await?;

    info!("User {} deleted chat {}", user.id, chat_id);
    Ok(StatusCode::NO_CONTENT)
}
