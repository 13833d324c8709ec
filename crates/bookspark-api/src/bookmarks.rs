use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use bookspark_services::run_blocking;
use bookspark_types::api::{
    Claims, ListBookmarksQuery, ListBookmarksResponse, MessageResponse, ReprocessResponse,
    SyncResponse, UpdateBookmarkRequest,
};
use bookspark_types::models::BookmarkStatus;

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult};
use crate::extract::{JsonBody, PathParam, QueryParams};

pub const DEFAULT_LIMIT: u32 = 50;
pub const MAX_LIMIT: u32 = 200;
pub const SNOOZE_DAYS: i64 = 7;
/// Analyzer batch run right after a manual sync.
pub const SYNC_PROCESS_BATCH: usize = 10;

pub async fn list_bookmarks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    QueryParams(query): QueryParams<ListBookmarksQuery>,
) -> ApiResult<Json<ListBookmarksResponse>> {
    let status = status_filter(query.status.as_deref())?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = query.offset.unwrap_or(0);
    let user_id = claims.sub;

    let bookmarks =
        run_blocking(&state.db, move |db| db.list_bookmarks(user_id, status, limit, offset)).await?;

    Ok(Json(ListBookmarksResponse {
        success: true,
        count: bookmarks.len(),
        bookmarks,
    }))
}

/// `None` lists every status. Absent means `new`.
fn status_filter(raw: Option<&str>) -> ApiResult<Option<BookmarkStatus>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(Some(BookmarkStatus::New)),
        Some("all") => Ok(None),
        Some(s) => s
            .parse::<BookmarkStatus>()
            .map(Some)
            .map_err(|e| ApiError::validation(e.to_string())),
    }
}

pub async fn update_bookmark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    JsonBody(req): JsonBody<UpdateBookmarkRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let bookmark_id: Uuid = req
        .bookmark_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation("Bookmark ID is required"))?
        .parse()
        .map_err(|_| ApiError::validation("Invalid bookmark ID"))?;

    let now = Utc::now();
    let (status, snooze_until) =
        resolve_update(req.status.as_deref(), req.snooze_until.as_deref(), now)?;

    let user_id = claims.sub;
    let updated = run_blocking(&state.db, move |db| {
        db.update_bookmark_status(bookmark_id, user_id, status, snooze_until, now)
    })
    .await?;
    if !updated {
        return Err(ApiError::NotFound("Bookmark not found".into()));
    }

    Ok(Json(MessageResponse {
        success: true,
        message: "Bookmark updated successfully".into(),
    }))
}

/// A snooze date always wins over the requested status. A bare `snoozed`
/// snoozes for a week; every other status clears the snooze date.
pub(crate) fn resolve_update(
    status: Option<&str>,
    snooze_until: Option<&str>,
    now: DateTime<Utc>,
) -> ApiResult<(BookmarkStatus, Option<DateTime<Utc>>)> {
    if let Some(raw) = snooze_until.map(str::trim).filter(|s| !s.is_empty()) {
        let until = DateTime::parse_from_rfc3339(raw)
            .map_err(|_| ApiError::validation("snoozeUntil must be an RFC 3339 timestamp"))?;
        return Ok((BookmarkStatus::Snoozed, Some(until.with_timezone(&Utc))));
    }

    let raw = status
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::validation("Status or snoozeUntil is required"))?;
    let status: BookmarkStatus = raw
        .parse()
        .map_err(|_| ApiError::Validation(format!("Invalid status '{}'", raw)))?;

    if !status.is_user_settable() {
        return Err(ApiError::Validation(format!("Status '{}' cannot be set directly", status)));
    }
    match status {
        BookmarkStatus::Snoozed => Ok((status, Some(now + Duration::days(SNOOZE_DAYS)))),
        other => Ok((other, None)),
    }
}

pub async fn sync_bookmarks(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<SyncResponse>> {
    info!(user_id = %claims.sub, "Starting bookmark sync");
    let stats = state.sync.sync_user(claims.sub).await?;

    let ai_processed = match state
        .processor
        .process_batch(SYNC_PROCESS_BATCH, Some(claims.sub))
        .await
    {
        Ok(n) => n,
        Err(e) => {
            warn!(user_id = %claims.sub, "Post-sync analysis failed: {}", e);
            0
        }
    };

    Ok(Json(SyncResponse {
        success: true,
        message: format!(
            "Synced {} bookmarks ({} new, {} updated), processed {} with AI",
            stats.processed, stats.new, stats.updated, ai_processed
        ),
        processed: stats.processed,
        new: stats.new,
        updated: stats.updated,
        ai_processed,
    }))
}

pub async fn reprocess_bookmark(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    PathParam(bookmark_id): PathParam<Uuid>,
) -> ApiResult<Json<ReprocessResponse>> {
    let user_id = claims.sub;
    run_blocking(&state.db, move |db| db.get_user_bookmark(bookmark_id, user_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Bookmark not found".into()))?;

    let analyzed = state.processor.reprocess(bookmark_id).await?;
    Ok(Json(ReprocessResponse {
        success: true,
        analyzed,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-05-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn snooze_date_overrides_status() {
        let (status, until) = resolve_update(Some("done"), Some("2025-06-01T00:00:00Z"), now()).unwrap();
        assert_eq!(status, BookmarkStatus::Snoozed);
        assert_eq!(until.unwrap().to_rfc3339(), "2025-06-01T00:00:00+00:00");
    }

    #[test]
    fn bare_snooze_defaults_to_a_week() {
        let (_, until) = resolve_update(Some("snoozed"), None, now()).unwrap();
        assert_eq!(until, Some(now() + Duration::days(7)));
    }

    #[test]
    fn other_statuses_clear_snooze() {
        assert_eq!(
            resolve_update(Some("archived"), None, now()).unwrap(),
            (BookmarkStatus::Archived, None)
        );
    }

    #[test]
    fn rejects_bad_input() {
        for (status, snooze) in [
            (Some("pending"), None),
            (Some("deleted"), None),
            (None, None),
            (Some("  "), None),
            (None, Some("tomorrow")),
        ] {
            assert!(
                matches!(resolve_update(status, snooze, now()), Err(ApiError::Validation(_))),
                "{status:?} {snooze:?}"
            );
        }
    }

    #[test]
    fn status_filter_defaults_to_new() {
        assert_eq!(status_filter(None).unwrap(), Some(BookmarkStatus::New));
        assert_eq!(status_filter(Some("all")).unwrap(), None);
        assert_eq!(status_filter(Some("pending")).unwrap(), Some(BookmarkStatus::Pending));
        assert!(status_filter(Some("bogus")).is_err());
    }
}
