pub mod auth;
pub mod bookmarks;
pub mod digest;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod settings;

#[cfg(test)]
mod tests;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// All routes. Digest links and sign-in are public; everything else needs a
/// session token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/signin", post(auth::sign_in))
        .route("/api/digest/action", get(digest::digest_action))
        .route("/api/digest/unsubscribe", get(digest::unsubscribe))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/bookmarks",
            get(bookmarks::list_bookmarks).patch(bookmarks::update_bookmark),
        )
        .route("/api/bookmarks/sync", post(bookmarks::sync_bookmarks))
        .route("/api/bookmarks/{id}/reprocess", post(bookmarks::reprocess_bookmark))
        .route(
            "/api/digest/send",
            get(digest::send_own_digest).post(digest::send_digest),
        )
        .route(
            "/api/digest/test",
            get(digest::test_digest_get).post(digest::test_digest_post),
        )
        .route(
            "/api/user/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .layer(from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}

async fn health() -> Json<Value> {
    Json(json!({ "success": true, "status": "ok" }))
}
