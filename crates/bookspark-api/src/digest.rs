use axum::{
    Extension, Json,
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use bookspark_services::email::{DigestAction, html_escape};
use bookspark_services::run_blocking;
use bookspark_types::api::{
    ActionQuery, Claims, MessageResponse, SendDigestRequest, SendDigestResponse, TestDigestQuery,
    TestDigestRequest,
};
use bookspark_types::models::BookmarkStatus;

use crate::auth::AppState;
use crate::bookmarks::SNOOZE_DAYS;
use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, JsonOrDefault, QueryParams};

const TEST_DIGEST_NAME: &str = "BookSpark User";

// -- One-click links (public, authorized by the signed token) --

pub async fn digest_action(State(state): State<AppState>, Query(query): Query<ActionQuery>) -> Response {
    match apply_action(&state, query.token.as_deref()).await {
        Ok(response) => response,
        Err(e) => error_page(e),
    }
}

async fn apply_action(state: &AppState, token: Option<&str>) -> ApiResult<Response> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Invalid token"))?;

    let now = Utc::now();
    let claims = state.links.decode_action(token, now)?;
    let action: DigestAction = claims
        .action
        .parse()
        .map_err(|_| ApiError::validation("Invalid action"))?;

    let not_found = || ApiError::NotFound("Bookmark not found".into());
    let user_id: Uuid = claims.user_id.parse().map_err(|_| not_found())?;
    let bookmark_id: Uuid = claims.bookmark_id.parse().map_err(|_| not_found())?;

    let bookmark = run_blocking(&state.db, move |db| db.get_user_bookmark(bookmark_id, user_id))
        .await?
        .ok_or_else(not_found)?;

    let (status, snooze_until, message) = match action {
        DigestAction::View => {
            let url = format!("{}/dashboard?highlight={}", state.email.base_url(), bookmark_id);
            return Ok(Redirect::temporary(&url).into_response());
        }
        DigestAction::Done => (BookmarkStatus::Done, None, "Great! Bookmark marked as done. 🎉"),
        DigestAction::Snooze => (
            BookmarkStatus::Snoozed,
            Some(now + Duration::days(SNOOZE_DAYS)),
            "Bookmark snoozed for 7 days. We'll remind you then! ⏰",
        ),
    };

    run_blocking(&state.db, move |db| {
        db.update_bookmark_status(bookmark_id, user_id, status, snooze_until, now)
    })
    .await?;
    info!(%user_id, %bookmark_id, %action, "Digest action applied");

    let summary = bookmark.summary.as_deref().unwrap_or("Bookmark");
    let detail = format!(
        "<div class=\"info\"><div class=\"summary\">{}</div><div class=\"status\">Status: {}</div></div>",
        html_escape(summary),
        status
    );
    Ok(Html(page(state, "✅", "Action Complete!", message, &detail)).into_response())
}

pub async fn unsubscribe(State(state): State<AppState>, Query(query): Query<ActionQuery>) -> Response {
    match apply_unsubscribe(&state, query.token.as_deref()).await {
        Ok(response) => response,
        Err(e) => error_page(e),
    }
}

async fn apply_unsubscribe(state: &AppState, token: Option<&str>) -> ApiResult<Response> {
    let token = token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::validation("Invalid token"))?;

    let user_id: Uuid = state
        .links
        .decode_unsubscribe(token, Utc::now())?
        .parse()
        .map_err(|_| ApiError::NotFound("User not found".into()))?;

    let updated = run_blocking(&state.db, move |db| db.set_digest_enabled(user_id, false, Utc::now())).await?;
    if !updated {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(%user_id, "Unsubscribed from digest");

    Ok(Html(page(
        state,
        "📭",
        "You're unsubscribed",
        "You won't receive daily digest emails anymore. You can turn them back on in settings.",
        "",
    ))
    .into_response())
}

fn error_page(err: ApiError) -> Response {
    if matches!(err, ApiError::Upstream(_)) {
        warn!("Digest link failed: {}", err);
    }
    (err.status(), html_escape(&err.to_string())).into_response()
}

fn page(state: &AppState, icon: &str, title: &str, message: &str, detail: &str) -> String {
    let dashboard = html_escape(&format!("{}/dashboard", state.email.base_url()));
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>BookSpark - {title}</title>
  <style>
    body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 0; background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); min-height: 100vh; display: flex; align-items: center; justify-content: center; }}
    .container {{ background: white; border-radius: 16px; padding: 48px 32px; text-align: center; box-shadow: 0 20px 40px rgba(0,0,0,0.1); max-width: 400px; margin: 20px; }}
    .icon {{ font-size: 64px; margin-bottom: 24px; }}
    .title {{ font-size: 24px; font-weight: 700; color: #1f2937; margin-bottom: 16px; }}
    .message {{ font-size: 16px; color: #6b7280; margin-bottom: 32px; line-height: 1.5; }}
    .info {{ background: #f9fafb; border-radius: 8px; padding: 16px; margin-bottom: 32px; text-align: left; }}
    .summary {{ font-weight: 600; color: #1f2937; margin-bottom: 8px; }}
    .status {{ font-size: 14px; color: #6b7280; }}
    .btn {{ display: inline-block; background: #3b82f6; color: white; text-decoration: none; padding: 12px 24px; border-radius: 8px; font-weight: 600; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="icon">{icon}</div>
    <div class="title">{title}</div>
    <div class="message">{message}</div>
    {detail}
    <a href="{dashboard}" class="btn">View Dashboard</a>
  </div>
</body>
</html>"#,
        title = html_escape(title),
        message = html_escape(message),
    )
}

// -- Authenticated digest triggers --

pub async fn send_digest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonOrDefault(req): JsonOrDefault<SendDigestRequest>,
) -> ApiResult<Json<SendDigestResponse>> {
    if req.send_to_all {
        let stats = state.digest.generate_for_all_users().await?;
        return Ok(Json(SendDigestResponse {
            success: true,
            message: format!(
                "Digest batch complete: {} sent, {} failed, {} skipped",
                stats.sent, stats.failed, stats.skipped
            ),
            stats: Some(stats),
        }));
    }

    send_for(&state, req.user_id.unwrap_or(claims.sub)).await
}

pub async fn send_own_digest(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SendDigestResponse>> {
    send_for(&state, claims.sub).await
}

async fn send_for(state: &AppState, user_id: Uuid) -> ApiResult<Json<SendDigestResponse>> {
    let outcome = state.digest.generate_and_send(user_id).await?;
    Ok(Json(SendDigestResponse {
        success: outcome.is_success(),
        message: outcome.message(),
        stats: None,
    }))
}

pub async fn test_digest_get(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    QueryParams(query): QueryParams<TestDigestQuery>,
) -> ApiResult<Json<MessageResponse>> {
    send_test(&state, claims.sub, query.email, None).await
}

pub async fn test_digest_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<TestDigestRequest>,
) -> ApiResult<Json<MessageResponse>> {
    send_test(&state, claims.sub, req.email, req.name).await
}

/// Explicit address and name win over the ones on the user record.
async fn send_test(
    state: &AppState,
    user_id: Uuid,
    email: Option<String>,
    name: Option<String>,
) -> ApiResult<Json<MessageResponse>> {
    let user = run_blocking(&state.db, move |db| db.get_user(user_id)).await?;
    let non_empty = |s: &String| !s.trim().is_empty();

    let email = email
        .filter(non_empty)
        .or_else(|| user.as_ref().and_then(|u| u.digest_address()).map(str::to_string))
        .ok_or_else(|| ApiError::validation("Email address required"))?;
    let name = name
        .filter(non_empty)
        .or_else(|| user.and_then(|u| u.name.or(u.username)))
        .unwrap_or_else(|| TEST_DIGEST_NAME.to_string());

    info!(to = %email, "Sending test digest");
    if !state.email.send_test_digest(&email, &name).await {
        return Err(ApiError::Upstream("Failed to send test digest".into()));
    }

    Ok(Json(MessageResponse {
        success: true,
        message: format!("Test digest sent to {}", email),
    }))
}
