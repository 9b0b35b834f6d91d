use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use chatter_db::models::ProfileUpdate;
use chatter_types::api::UpdateProfileRequest;

use crate::error::{ApiError, DbResultExt, JsonBody};
use crate::middleware::CurrentUser;
use crate::validation::{parse_id, validate_email, validate_username};
use crate::{AppState, run_db};

pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> impl IntoResponse {
    Json(json!({ "user": user }))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let update = ProfileUpdate {
        username: validate_username(&req.username)?,
        email: validate_email(&req.email)?,
        bio: req.bio,
        avatar_url: req.avatar_url,
    };

    let user_id = user.id;
    let user = run_db(&state, move |db| {
        db.update_profile(user_id, &update)
            .or_conflict("username or email already taken")
    })
    .await?;

    Ok(Json(json!({ "user": user })))
}

pub async fn touch_last_seen(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let user = run_db(&state, move |db| {
        db.touch_last_seen(user_id).or_not_found("user not found")
    })
    .await?;

    Ok(Json(json!({ "user": user })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&raw_id, "user id")?;
    let user = run_db(&state, move |db| {
        db.get_user_by_id(user_id).or_not_found("user not found")
    })
    .await?;

    Ok(Json(json!({ "user": user })))
}

/// Exact, case-insensitive username lookup.
pub async fn find_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let username = username.trim().to_lowercase();
    let user = run_db(&state, move |db| {
        db.get_user_by_username(&username)
            .map(|row| row.into_user())
            .or_not_found("user not found")
    })
    .await?;

    Ok(Json(json!({ "user": user })))
}
