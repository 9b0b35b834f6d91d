pub mod auth;
pub mod chats;
pub mod error;
pub mod members;
pub mod messages;
pub mod middleware;
pub mod users;
pub mod validation;

use std::sync::Arc;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
};
use serde_json::json;
use tracing::error;

use chatter_db::Database;

use crate::error::ApiError;
use crate::middleware::{require_auth, require_membership, require_message_access};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub token_ttl: chrono::Duration,
}

impl AppStateInner {
    pub fn new(db: Database, token_ttl: chrono::Duration) -> AppState {
        Arc::new(Self { db, token_ttl })
    }
}

/// Run blocking storage work off the async runtime.
pub async fn run_db<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::internal("storage task failed")
        })?
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// All routes. Auth runs before the membership and message-access gates.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let chat_routes = Router::new()
        .route(
            "/chats/{chat_id}",
            get(chats::get_chat).put(chats::update_chat).delete(chats::delete_chat),
        )
        .route(
            "/chats/{chat_id}/members",
            get(members::list_members).post(members::add_member),
        )
        .route(
            "/chats/{chat_id}/members/{user_id}",
            delete(members::remove_member),
        )
        .route("/chats/{chat_id}/members/{user_id}/role", get(members::get_role))
        .route("/chats/{chat_id}/members/{user_id}/check", get(members::check_member))
        .route("/chats/{chat_id}/read", put(members::mark_read))
        .route("/chats/{chat_id}/mute", put(members::mute))
        .route("/chats/{chat_id}/unmute", put(members::unmute))
        .route("/chats/{chat_id}/messages", post(messages::send_message))
        .route("/chats/{chat_id}/messages/unread", get(messages::unread_count))
        .route(
            "/chats/{chat_id}/messages/{offset}/{limit}",
            get(messages::list_messages),
        )
        .route_layer(from_fn_with_state(state.clone(), require_membership));

    let message_routes = Router::new()
        .route(
            "/messages/{message_id}",
            get(messages::get_message)
                .put(messages::edit_message)
                .delete(messages::delete_message),
        )
        .route_layer(from_fn_with_state(state.clone(), require_message_access));

    let protected_routes = Router::new()
        .route("/auth/password", put(auth::change_password))
        .route("/users/me", get(users::me).put(users::update_me))
        .route("/users/me/last-seen", put(users::touch_last_seen))
        .route("/users/search/{username}", get(users::find_by_username))
        .route("/users/{user_id}", get(users::get_user))
        .route("/chats", get(chats::list_chats).post(chats::create_chat))
        .merge(chat_routes)
        .merge(message_routes)
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
