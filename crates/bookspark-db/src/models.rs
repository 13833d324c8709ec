//! Database row types. These map directly to SQLite rows and are converted
//! into the bookspark-types records at the edge of the DB layer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Row;
use uuid::Uuid;

use bookspark_types::models::{Bookmark, EngagementMetrics, Media, User};

use crate::parse_ts;

pub(crate) const USER_COLUMNS: &str = "id, provider_id, username, name, provider_email, email, \
     avatar_url, digest_enabled, digest_time, timezone, last_sync_at, last_digest_sent, \
     created_at, updated_at";

pub(crate) const BOOKMARK_COLUMNS: &str = "id, user_id, external_id, content, cleaned_content, \
     author_name, author_username, author_avatar_url, author_verified, url, expanded_urls, media, \
     metrics, content_type, summary, category, topics, suggested_actions, status, snooze_until, \
     processed_at, posted_at, created_at, updated_at";

pub struct UserRow {
    pub id: String,
    pub provider_id: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub provider_email: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub digest_enabled: bool,
    pub digest_time: String,
    pub timezone: String,
    pub last_sync_at: Option<String>,
    pub last_digest_sent: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            provider_id: row.get(1)?,
            username: row.get(2)?,
            name: row.get(3)?,
            provider_email: row.get(4)?,
            email: row.get(5)?,
            avatar_url: row.get(6)?,
            digest_enabled: row.get(7)?,
            digest_time: row.get(8)?,
            timezone: row.get(9)?,
            last_sync_at: row.get(10)?,
            last_digest_sent: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id.parse().with_context(|| format!("Corrupt user id '{}'", row.id))?,
            provider_id: row.provider_id,
            username: row.username,
            name: row.name,
            provider_email: row.provider_email,
            email: row.email,
            avatar_url: row.avatar_url,
            digest_enabled: row.digest_enabled,
            digest_time: row.digest_time,
            timezone: row.timezone,
            last_sync_at: parse_opt_ts(row.last_sync_at.as_deref())?,
            last_digest_sent: parse_opt_ts(row.last_digest_sent.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

pub struct BookmarkRow {
    pub id: String,
    pub user_id: String,
    pub external_id: String,
    pub content: String,
    pub cleaned_content: String,
    pub author_name: Option<String>,
    pub author_username: Option<String>,
    pub author_avatar_url: Option<String>,
    pub author_verified: bool,
    pub url: Option<String>,
    pub expanded_urls: String,
    pub media: String,
    pub metrics: String,
    pub content_type: String,
    pub summary: Option<String>,
    pub category: Option<String>,
    pub topics: String,
    pub suggested_actions: String,
    pub status: String,
    pub snooze_until: Option<String>,
    pub processed_at: Option<String>,
    pub posted_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl BookmarkRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            external_id: row.get(2)?,
            content: row.get(3)?,
            cleaned_content: row.get(4)?,
            author_name: row.get(5)?,
            author_username: row.get(6)?,
            author_avatar_url: row.get(7)?,
            author_verified: row.get(8)?,
            url: row.get(9)?,
            expanded_urls: row.get(10)?,
            media: row.get(11)?,
            metrics: row.get(12)?,
            content_type: row.get(13)?,
            summary: row.get(14)?,
            category: row.get(15)?,
            topics: row.get(16)?,
            suggested_actions: row.get(17)?,
            status: row.get(18)?,
            snooze_until: row.get(19)?,
            processed_at: row.get(20)?,
            posted_at: row.get(21)?,
            created_at: row.get(22)?,
            updated_at: row.get(23)?,
        })
    }
}

impl TryFrom<BookmarkRow> for Bookmark {
    type Error = anyhow::Error;

    fn try_from(row: BookmarkRow) -> Result<Self> {
        let id: Uuid = row.id.parse().with_context(|| format!("Corrupt bookmark id '{}'", row.id))?;
        let user_id: Uuid = row
            .user_id
            .parse()
            .with_context(|| format!("Corrupt user_id '{}' on bookmark '{}'", row.user_id, row.id))?;

        Ok(Bookmark {
            id,
            user_id,
            external_id: row.external_id,
            content: row.content,
            cleaned_content: row.cleaned_content,
            author_name: row.author_name,
            author_username: row.author_username,
            author_avatar_url: row.author_avatar_url,
            author_verified: row.author_verified,
            url: row.url,
            expanded_urls: serde_json::from_str(&row.expanded_urls)
                .with_context(|| format!("Corrupt expanded_urls on bookmark '{}'", row.id))?,
            media: serde_json::from_str::<Vec<Media>>(&row.media)
                .with_context(|| format!("Corrupt media on bookmark '{}'", row.id))?,
            metrics: serde_json::from_str::<EngagementMetrics>(&row.metrics)
                .with_context(|| format!("Corrupt metrics on bookmark '{}'", row.id))?,
            content_type: row.content_type.parse()?,
            summary: row.summary,
            category: row.category,
            topics: serde_json::from_str(&row.topics)
                .with_context(|| format!("Corrupt topics on bookmark '{}'", row.id))?,
            suggested_actions: serde_json::from_str(&row.suggested_actions)
                .with_context(|| format!("Corrupt suggested_actions on bookmark '{}'", row.id))?,
            status: row.status.parse()?,
            snooze_until: parse_opt_ts(row.snooze_until.as_deref())?,
            processed_at: parse_opt_ts(row.processed_at.as_deref())?,
            posted_at: parse_opt_ts(row.posted_at.as_deref())?,
            created_at: parse_ts(&row.created_at)?,
            updated_at: parse_ts(&row.updated_at)?,
        })
    }
}

fn parse_opt_ts(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}

// -- Write models --

/// A normalized post ready to be upserted. Carries only the fields a sync
/// refreshes; AI fields and status are owned by other writers.
#[derive(Debug, Clone)]
pub struct NewBookmark {
    pub user_id: Uuid,
    pub external_id: String,
    pub content: String,
    pub cleaned_content: String,
    pub author_name: Option<String>,
    pub author_username: Option<String>,
    pub author_avatar_url: Option<String>,
    pub author_verified: bool,
    pub url: Option<String>,
    pub expanded_urls: Vec<String>,
    pub media: Vec<Media>,
    pub metrics: EngagementMetrics,
    pub content_type: bookspark_types::models::ContentType,
    pub posted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Identity and tokens delivered by the OAuth provider at sign-in.
#[derive(Debug, Clone, Default)]
pub struct SignInProfile {
    pub provider_id: String,
    pub username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SettingsUpdate {
    pub digest_enabled: bool,
    pub digest_time: String,
    pub timezone: String,
    /// `None` leaves the stored contact address untouched.
    pub email: Option<String>,
}
