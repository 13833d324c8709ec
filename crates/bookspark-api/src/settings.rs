use std::sync::LazyLock;

use axum::{Extension, Json, extract::State};
use chrono::Utc;
use regex::Regex;
use serde_json::Value;

use bookspark_db::SettingsUpdate;
use bookspark_services::run_blocking;
use bookspark_types::api::{Claims, MessageResponse, Settings, SettingsResponse, UpdateSettingsRequest};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::JsonBody;

pub const DEFAULT_DIGEST_TIME: &str = "08:00:00";
pub const DEFAULT_TIMEZONE: &str = "UTC";

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]:[0-5][0-9]$").expect("valid digest time pattern")
});

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"));

pub async fn get_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SettingsResponse>> {
    let user_id = claims.sub;
    let user = run_blocking(&state.db, move |db| db.get_user(user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(SettingsResponse {
        success: true,
        settings: Settings::from(&user),
    }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<UpdateSettingsRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let update = validate_settings(req)?;
    let user_id = claims.sub;

    let updated = run_blocking(&state.db, move |db| db.update_settings(user_id, &update, Utc::now())).await?;
    if !updated {
        return Err(ApiError::NotFound("User not found".into()));
    }

    Ok(Json(MessageResponse {
        success: true,
        message: "Settings updated successfully".into(),
    }))
}

pub(crate) fn validate_settings(req: UpdateSettingsRequest) -> ApiResult<SettingsUpdate> {
    let digest_enabled = match req.digest_enabled {
        Some(Value::Bool(enabled)) => enabled,
        _ => return Err(ApiError::validation("digest_enabled must be a boolean")),
    };

    let digest_time = match trimmed(req.digest_time) {
        Some(time) if TIME_RE.is_match(&time) => time,
        Some(_) => return Err(ApiError::validation("Invalid time format")),
        None => DEFAULT_DIGEST_TIME.to_string(),
    };

    let timezone = trimmed(req.timezone).unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());

    let email = match trimmed(req.email) {
        Some(email) if EMAIL_RE.is_match(&email) => Some(email),
        Some(_) => return Err(ApiError::validation("Invalid email address")),
        None => None,
    };

    Ok(SettingsUpdate {
        digest_enabled,
        digest_time,
        timezone,
        email,
    })
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
