use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde_json::json;
use tracing::info;

use chatter_crypto::password::{hash_password, verify_password};
use chatter_db::DbError;
use chatter_db::models::NewUser;
use chatter_types::api::{ChangePasswordRequest, LoginRequest, RegisterRequest};

use crate::error::{ApiError, DbResultExt, JsonBody};
use crate::middleware::CurrentUser;
use crate::validation::{validate_email, validate_password, validate_username};
use crate::{AppState, run_db};

const BAD_CREDENTIALS: &str = "invalid username or password";

pub async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = validate_username(&req.username)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    let user = run_db(&state, move |db| {
        // Argon2 is slow on purpose; keep it off the async threads too.
        let password_hash = hash_password(&req.password)?;
        db.create_user(&NewUser {
            username,
            email,
            password_hash,
            bio: req.bio,
            avatar_url: req.avatar_url,
        })
        .or_conflict("username or email already taken")
    })
    .await?;

    info!("Registered user {} ({})", user.id, user.username);
    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

pub async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_lowercase();
    let ttl = state.token_ttl;

    let token = run_db(&state, move |db| {
        let row = match db.get_user_by_username(&username) {
            Ok(row) => row,
            Err(DbError::NotFound) => return Err(ApiError::unauthorized(BAD_CREDENTIALS)),
            Err(e) => return Err(e.into()),
        };
        if !verify_password(&req.password, &row.password_hash)? {
            return Err(ApiError::unauthorized(BAD_CREDENTIALS));
        }
        Ok(db.issue_token(row.id, ttl)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(json!({ "auth_token": token }))))
}

/// Changing the password signs the user out everywhere, this session included.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    JsonBody(req): JsonBody<ChangePasswordRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_password(&req.password)?;

    let user_id = user.id;
    run_db(&state, move |db| {
        let password_hash = hash_password(&req.password)?;
        db.update_password(user_id, &password_hash)
            .or_not_found("user not found")
    })
    .await?;

    info!("User {} changed their password; all tokens revoked", user_id);
    Ok(Json(json!({ "message": "password updated" })))
}
