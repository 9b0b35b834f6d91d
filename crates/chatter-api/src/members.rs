use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use tracing::info;

use chatter_db::DbError;
use chatter_types::api::{AddMemberRequest, MarkReadRequest};
use chatter_types::models::Role;

use crate::error::{ApiError, DbResultExt, JsonBody};
use crate::middleware::{ChatAccess, CurrentUser};
use crate::validation::parse_id;
use crate::{AppState, run_db};

pub async fn list_members(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = access.chat_id;
    let members = run_db(&state, move |db| Ok(db.list_members(chat_id)?)).await?;
    Ok(Json(json!({ "members": members })))
}

/// Owners and admins may add members; only owners may grant owner or admin.
pub async fn add_member(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
    JsonBody(req): JsonBody<AddMemberRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !access.role.can_manage() {
        return Err(ApiError::forbidden("only owners and admins can add members"));
    }
    let role = req.role.as_deref().map_or(Role::Member, Role::coerce);
    if role.can_manage() && access.role != Role::Owner {
        return Err(ApiError::forbidden(format!(
            "only the owner can grant the {} role",
            role
        )));
    }

    let chat_id = access.chat_id;
    let user_id = req.user_id;
    let member = run_db(&state, move |db| match db.add_member(chat_id, user_id, role.as_str()) {
        Ok(member) => Ok(member),
        Err(DbError::Conflict(_)) => Err(ApiError::Conflict("user is already a member".into())),
        Err(DbError::InvalidReference(_)) => Err(ApiError::not_found("user not found")),
        Err(e) => Err(e.into()),
    })
    .await?;

    info!("User {} added to chat {} as {}", user_id, chat_id, member.role);
    Ok((StatusCode::CREATED, Json(json!({ "member": member }))))
}

/// Anyone may leave; removing someone else takes an owner or admin. The
/// owner can never be removed.
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
    Path((_, raw_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let target_id = parse_id(&raw_user_id, "user id")?;
    if target_id != user.id && !access.role.can_manage() {
        return Err(ApiError::forbidden("only owners and admins can remove other members"));
    }

    let chat_id = access.chat_id;
    run_db(&state, move |db| {
        let target_role = db.role_of(chat_id, target_id).or_not_found("member not found")?;
        if target_role == Role::Owner {
            return Err(ApiError::forbidden("the chat owner cannot be removed"));
        }
        db.remove_member(chat_id, target_id).or_not_found("member not found")
    })
    .await?;

    info!("User {} removed from chat {} by user {}", target_id, chat_id, user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_role(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
    Path((_, raw_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&raw_user_id, "user id")?;
    let chat_id = access.chat_id;
    let role = run_db(&state, move |db| {
        db.role_of(chat_id, user_id).or_not_found("member not found")
    })
    .await?;

    Ok(Json(json!({ "role": role })))
}

pub async fn check_member(
    State(state): State<AppState>,
    Extension(access): Extension<ChatAccess>,
    Path((_, raw_user_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&raw_user_id, "user id")?;
    let chat_id = access.chat_id;
    let is_member = run_db(&state, move |db| Ok(db.is_member(chat_id, user_id)?)).await?;

    Ok(Json(json!({ "is_member": is_member })))
}

/// Advance the caller's read cursor. Moving it backwards is a silent no-op;
/// the response carries the cursor as stored.
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
    JsonBody(req): JsonBody<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = access.chat_id;
    let user_id = user.id;
    let message_id = req.message_id;

    let last_read = run_db(&state, move |db| {
        let message = db.get_message(message_id).or_not_found("message not found")?;
        if message.chat_id != chat_id {
            return Err(ApiError::validation("message does not belong to this chat"));
        }
        db.advance_last_read(chat_id, user_id, message_id)
            .or_not_found("member not found")
    })
    .await?;

    Ok(Json(json!({ "last_read_message_id": last_read })))
}

pub async fn mute(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
) -> Result<impl IntoResponse, ApiError> {
    set_muted(state, access.chat_id, user.id, true).await
}

pub async fn unmute(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Extension(access): Extension<ChatAccess>,
) -> Result<impl IntoResponse, ApiError> {
    set_muted(state, access.chat_id, user.id, false).await
}

async fn set_muted(
    state: AppState,
    chat_id: i64,
    user_id: i64,
    muted: bool,
) -> Result<Json<serde_json::Value>, ApiError> {
    let member = run_db(&state, move |db| {
        db.set_muted(chat_id, user_id, muted).or_not_found("member not found")
    })
    .await?;

    Ok(Json(json!({ "muted": member.muted })))
}
