use std::sync::Arc;

use axum::{Json, extract::State, http::HeaderMap};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{info, warn};
use uuid::Uuid;

use bookspark_crypto::LinkSigner;
use bookspark_db::{Database, SignInProfile};
use bookspark_services::digest::DigestGenerator;
use bookspark_services::email::EmailService;
use bookspark_services::processor::ContentProcessor;
use bookspark_services::run_blocking;
use bookspark_services::sync::BookmarkSync;
use bookspark_types::api::{Claims, SignInRequest, SignInResponse};

use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;

pub const BRIDGE_SECRET_HEADER: &str = "x-bookspark-bridge-secret";
pub const SESSION_DAYS: i64 = 30;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    /// Shared with the OAuth integration. Sign-in is refused while unset.
    pub bridge_secret: Option<String>,
    pub links: LinkSigner,
    pub email: Arc<EmailService>,
    pub sync: BookmarkSync,
    pub processor: ContentProcessor,
    pub digest: DigestGenerator,
}

/// Hand-off from the OAuth provider integration: store the profile and
/// tokens, then issue a session.
pub async fn sign_in(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<SignInRequest>,
) -> ApiResult<Json<SignInResponse>> {
    let Some(expected) = state.bridge_secret.as_deref() else {
        warn!("Sign-in attempted but no bridge secret is configured");
        return Err(ApiError::Auth("Sign-in is not configured".into()));
    };
    let provided = headers
        .get(BRIDGE_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
        return Err(ApiError::Auth("Not authenticated".into()));
    }

    if req.provider_id.trim().is_empty() {
        return Err(ApiError::validation("provider_id is required"));
    }

    let profile = SignInProfile {
        provider_id: req.provider_id,
        username: req.username,
        name: req.name,
        email: req.email,
        avatar_url: req.avatar_url,
        access_token: req.access_token,
        refresh_token: req.refresh_token,
    };
    let user = run_blocking(&state.db, move |db| db.upsert_user(&profile, Utc::now())).await?;

    let username = user.username.as_deref().unwrap_or(&user.provider_id);
    let token = create_token(&state.jwt_secret, user.id, username)?;

    info!(user_id = %user.id, "User signed in");
    Ok(Json(SignInResponse {
        success: true,
        user_id: user.id,
        token,
    }))
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
