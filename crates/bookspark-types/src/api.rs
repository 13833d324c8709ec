use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Bookmark, User};

// -- JWT Claims --

/// Session claims carried by the bearer token issued at sign-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Auth --

/// Profile handed over by the OAuth provider integration after a successful
/// authorization.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignInRequest {
    pub provider_id: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SignInResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub token: String,
}

// -- Bookmarks --

#[derive(Debug, Deserialize)]
pub struct ListBookmarksQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ListBookmarksResponse {
    pub success: bool,
    pub bookmarks: Vec<Bookmark>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookmarkRequest {
    pub bookmark_id: Option<String>,
    pub status: Option<String>,
    pub snooze_until: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub processed: usize,
    pub new: usize,
    pub updated: usize,
    pub ai_processed: usize,
}

#[derive(Debug, Serialize)]
pub struct ReprocessResponse {
    pub success: bool,
    pub analyzed: bool,
}

// -- Digest --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDigestRequest {
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub send_to_all: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestStats {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Serialize)]
pub struct SendDigestResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<DigestStats>,
}

#[derive(Debug, Deserialize)]
pub struct ActionQuery {
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TestDigestQuery {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TestDigestRequest {
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

// -- Settings --

#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub digest_enabled: bool,
    pub digest_time: String,
    pub timezone: String,
    pub email: Option<String>,
}

impl From<&User> for Settings {
    fn from(user: &User) -> Self {
        Self {
            digest_enabled: user.digest_enabled,
            digest_time: user.digest_time.clone(),
            timezone: user.timezone.clone(),
            email: user.email.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    pub success: bool,
    pub settings: Settings,
}

/// Fields are loosely typed so that a wrong JSON type comes back as a
/// validation message instead of an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub digest_enabled: Option<serde_json::Value>,
    pub digest_time: Option<String>,
    pub timezone: Option<String>,
    pub email: Option<String>,
}
