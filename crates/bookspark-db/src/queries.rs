use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use bookspark_types::models::{Analysis, Bookmark, BookmarkStatus, User};

use crate::models::{
    BOOKMARK_COLUMNS, BookmarkRow, NewBookmark, SettingsUpdate, SignInProfile, USER_COLUMNS,
    UpsertOutcome, UserRow,
};
use crate::{Database, format_ts};

impl Database {
    // -- Users --

    /// Create or refresh a user keyed by provider id. Stored tokens are only
    /// replaced when the provider sent new ones.
    pub fn upsert_user(&self, profile: &SignInProfile, now: DateTime<Utc>) -> Result<User> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, provider_id, username, name, provider_email, avatar_url,
                                    access_token, refresh_token, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(provider_id) DO UPDATE SET
                     username = excluded.username,
                     name = excluded.name,
                     provider_email = excluded.provider_email,
                     avatar_url = excluded.avatar_url,
                     access_token = COALESCE(excluded.access_token, users.access_token),
                     refresh_token = COALESCE(excluded.refresh_token, users.refresh_token),
                     updated_at = excluded.updated_at",
                params![
                    Uuid::new_v4().to_string(),
                    profile.provider_id,
                    profile.username,
                    profile.name,
                    profile.email,
                    profile.avatar_url,
                    profile.access_token,
                    profile.refresh_token,
                    format_ts(now),
                ],
            )?;

            query_user(conn, "provider_id", &profile.provider_id)?
                .ok_or_else(|| anyhow!("User {} missing after upsert", profile.provider_id))
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    pub fn get_access_token(&self, user_id: Uuid) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let token: Option<Option<String>> = conn
                .query_row(
                    "SELECT access_token FROM users WHERE id = ?1",
                    [user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(token.flatten().filter(|t| !t.is_empty()))
        })
    }

    pub fn digest_enabled_users(&self) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE digest_enabled = 1 ORDER BY created_at"
            ))?;
            let rows = stmt
                .query_map([], UserRow::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(User::try_from).collect()
        })
    }

    pub fn update_settings(
        &self,
        user_id: Uuid,
        update: &SettingsUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET
                     digest_enabled = ?2,
                     digest_time = ?3,
                     timezone = ?4,
                     email = COALESCE(?5, email),
                     updated_at = ?6
                 WHERE id = ?1",
                params![
                    user_id.to_string(),
                    update.digest_enabled,
                    update.digest_time,
                    update.timezone,
                    update.email,
                    format_ts(now),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_digest_enabled(&self, user_id: Uuid, enabled: bool, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET digest_enabled = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id.to_string(), enabled, format_ts(now)],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn touch_last_sync(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_sync_at = ?2 WHERE id = ?1",
                params![user_id.to_string(), format_ts(at)],
            )?;
            Ok(())
        })
    }

    pub fn set_last_digest_sent(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_digest_sent = ?2 WHERE id = ?1",
                params![user_id.to_string(), format_ts(at)],
            )?;
            Ok(())
        })
    }

    // -- Bookmarks --

    /// Insert a post or refresh its content fields in place. Status and AI
    /// fields of an existing row are left alone.
    pub fn upsert_bookmark(
        &self,
        bookmark: &NewBookmark,
        now: DateTime<Utc>,
    ) -> Result<(Uuid, UpsertOutcome)> {
        let expanded_urls = serde_json::to_string(&bookmark.expanded_urls)?;
        let media = serde_json::to_string(&bookmark.media)?;
        let metrics = serde_json::to_string(&bookmark.metrics)?;

        self.with_conn(|conn| {
            let user_id = bookmark.user_id.to_string();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM bookmarks WHERE user_id = ?1 AND external_id = ?2",
                    params![user_id, bookmark.external_id],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = if existing.is_some() {
                UpsertOutcome::Updated
            } else {
                UpsertOutcome::Inserted
            };
            let id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());

            conn.execute(
                "INSERT INTO bookmarks (id, user_id, external_id, content, cleaned_content,
                                        author_name, author_username, author_avatar_url,
                                        author_verified, url, expanded_urls, media, metrics,
                                        content_type, posted_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                         'new', ?16, ?16)
                 ON CONFLICT(user_id, external_id) DO UPDATE SET
                     content = excluded.content,
                     cleaned_content = excluded.cleaned_content,
                     author_name = excluded.author_name,
                     author_username = excluded.author_username,
                     author_avatar_url = excluded.author_avatar_url,
                     author_verified = excluded.author_verified,
                     url = excluded.url,
                     expanded_urls = excluded.expanded_urls,
                     media = excluded.media,
                     metrics = excluded.metrics,
                     content_type = excluded.content_type,
                     posted_at = excluded.posted_at,
                     updated_at = excluded.updated_at",
                params![
                    id,
                    user_id,
                    bookmark.external_id,
                    bookmark.content,
                    bookmark.cleaned_content,
                    bookmark.author_name,
                    bookmark.author_username,
                    bookmark.author_avatar_url,
                    bookmark.author_verified,
                    bookmark.url,
                    expanded_urls,
                    media,
                    metrics,
                    bookmark.content_type.as_str(),
                    bookmark.posted_at.map(format_ts),
                    format_ts(now),
                ],
            )?;

            Ok((id.parse()?, outcome))
        })
    }

    pub fn get_bookmark(&self, id: Uuid) -> Result<Option<Bookmark>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ?1");
            Ok(query_bookmarks(conn, &sql, [id.to_string()])?.into_iter().next())
        })
    }

    /// Fetch a bookmark only if it belongs to `user_id`.
    pub fn get_user_bookmark(&self, id: Uuid, user_id: Uuid) -> Result<Option<Bookmark>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {BOOKMARK_COLUMNS} FROM bookmarks WHERE id = ?1 AND user_id = ?2");
            Ok(query_bookmarks(conn, &sql, [id.to_string(), user_id.to_string()])?
                .into_iter()
                .next())
        })
    }

    /// Newest first. `status = None` lists every status.
    pub fn list_bookmarks(
        &self,
        user_id: Uuid,
        status: Option<BookmarkStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Bookmark>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks
                 WHERE user_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC
                 LIMIT ?3 OFFSET ?4"
            );
            query_bookmarks(
                conn,
                &sql,
                params![user_id.to_string(), status.map(|s| s.as_str()), limit, offset],
            )
        })
    }

    /// Returns false when no bookmark with that id belongs to the user.
    pub fn update_bookmark_status(
        &self,
        id: Uuid,
        user_id: Uuid,
        status: BookmarkStatus,
        snooze_until: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE bookmarks SET status = ?3, snooze_until = ?4, updated_at = ?5
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    id.to_string(),
                    user_id.to_string(),
                    status.as_str(),
                    snooze_until.map(format_ts),
                    format_ts(now),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Rows the analyzer has not seen yet, in insertion order.
    pub fn unprocessed_bookmarks(&self, limit: usize, user_id: Option<Uuid>) -> Result<Vec<Bookmark>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks
                 WHERE processed_at IS NULL AND (?1 IS NULL OR user_id = ?1)
                 ORDER BY rowid
                 LIMIT ?2"
            );
            query_bookmarks(
                conn,
                &sql,
                params![user_id.map(|id| id.to_string()), limit as i64],
            )
        })
    }

    pub fn save_analysis(&self, id: Uuid, analysis: &Analysis, at: DateTime<Utc>) -> Result<bool> {
        let topics = serde_json::to_string(&analysis.topics)?;
        let actions = serde_json::to_string(&analysis.suggested_actions)?;

        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE bookmarks SET
                     summary = ?2,
                     category = ?3,
                     topics = ?4,
                     suggested_actions = ?5,
                     processed_at = ?6,
                     updated_at = ?6
                 WHERE id = ?1",
                params![
                    id.to_string(),
                    analysis.summary,
                    analysis.content_type,
                    topics,
                    actions,
                    format_ts(at),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Forget the analyzer output so the bookmark counts as unprocessed again.
    pub fn clear_analysis(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE bookmarks SET
                     summary = NULL,
                     category = NULL,
                     topics = '[]',
                     suggested_actions = '[]',
                     processed_at = NULL,
                     updated_at = ?2
                 WHERE id = ?1",
                params![id.to_string(), format_ts(now)],
            )?;
            Ok(changed > 0)
        })
    }

    /// Digest candidate pool: new or pending, analyzed, created at or after
    /// `since`, newest first.
    pub fn digest_candidates(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Bookmark>> {
        self.with_conn(|conn| {
            let statuses = candidate_statuses();
            let sql = format!(
                "SELECT {BOOKMARK_COLUMNS} FROM bookmarks
                 WHERE user_id = ?1
                   AND status IN ({statuses})
                   AND summary IS NOT NULL
                   AND processed_at IS NOT NULL
                   AND created_at >= ?2
                 ORDER BY created_at DESC
                 LIMIT ?3"
            );
            query_bookmarks(
                conn,
                &sql,
                params![user_id.to_string(), format_ts(since), limit as i64],
            )
        })
    }

    /// Mark bookmarks as surfaced by a digest. Bookmarks that left the
    /// candidate statuses in the meantime are not touched.
    pub fn mark_pending(&self, ids: &[Uuid], now: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "UPDATE bookmarks SET status = '{}', updated_at = ?1
                 WHERE status IN ({}) AND id IN ({})",
                BookmarkStatus::Pending,
                candidate_statuses(),
                placeholders.join(", ")
            );

            let mut values: Vec<String> = Vec::with_capacity(ids.len() + 1);
            values.push(format_ts(now));
            values.extend(ids.iter().map(Uuid::to_string));

            let changed = conn.execute(&sql, rusqlite::params_from_iter(values.iter()))?;
            Ok(changed)
        })
    }
}

/// SQL list of the statuses a digest draws from, e.g. `'new', 'pending'`.
fn candidate_statuses() -> String {
    BookmarkStatus::ALL
        .into_iter()
        .filter(BookmarkStatus::is_digest_candidate)
        .map(|status| format!("'{}'", status))
        .collect::<Vec<_>>()
        .join(", ")
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<User>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"))?;
    let row = stmt.query_row([value], UserRow::from_row).optional()?;
    row.map(User::try_from).transpose()
}

fn query_bookmarks<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Bookmark>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, BookmarkRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.into_iter().map(Bookmark::try_from).collect()
}
