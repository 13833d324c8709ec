use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// -- Status --

/// Lifecycle status of a bookmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookmarkStatus {
    New,
    Pending,
    Done,
    Snoozed,
    Archived,
}

impl BookmarkStatus {
    pub const ALL: [BookmarkStatus; 5] = [
        Self::New,
        Self::Pending,
        Self::Done,
        Self::Snoozed,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Pending => "pending",
            Self::Done => "done",
            Self::Snoozed => "snoozed",
            Self::Archived => "archived",
        }
    }

    /// Statuses a digest may pick bookmarks from.
    pub fn is_digest_candidate(&self) -> bool {
        matches!(self, Self::New | Self::Pending)
    }

    /// Users may move a bookmark to any status except `Pending`, which only
    /// the digest send step sets.
    pub fn is_user_settable(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for BookmarkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookmarkStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "status",
                value: s.to_string(),
            })
    }
}

// -- Content type --

/// Shape of a post, derived from its attachments at sync time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Tweet,
    Image,
    Video,
    Link,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tweet => "tweet",
            Self::Image => "image",
            Self::Video => "video",
            Self::Link => "link",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tweet" => Ok(Self::Tweet),
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "link" => Ok(Self::Link),
            other => Err(UnknownVariant {
                kind: "content type",
                value: other.to_string(),
            }),
        }
    }
}

// -- Media & metrics --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Photo,
    Video,
    AnimatedGif,
    #[serde(other)]
    Other,
}

impl MediaKind {
    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::AnimatedGif)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub media_key: String,
    pub kind: MediaKind,
    pub url: Option<String>,
}

/// Engagement counters as they were at the last sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementMetrics {
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub quote_count: u64,
    #[serde(default)]
    pub bookmark_count: u64,
    #[serde(default)]
    pub impression_count: u64,
}

// -- Analysis --

/// Structured result of the content analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub summary: String,
    pub content_type: String,
    pub topics: Vec<String>,
    pub suggested_actions: Vec<String>,
}

// -- Records --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub provider_id: String,
    pub username: Option<String>,
    pub name: Option<String>,
    /// Address reported by the identity provider.
    pub provider_email: Option<String>,
    /// Contact address set in settings; preferred over `provider_email`.
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub digest_enabled: bool,
    pub digest_time: String,
    pub timezone: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_digest_sent: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn digest_address(&self) -> Option<&str> {
        self.email
            .as_deref()
            .or(self.provider_email.as_deref())
            .filter(|addr| !addr.trim().is_empty())
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or("there")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub id: Uuid,
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
    pub content_type: ContentType,
    pub summary: Option<String>,
    /// Free-form category reported by the analyzer ("tutorial", "news", ...).
    pub category: Option<String>,
    pub topics: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub status: BookmarkStatus,
    pub snooze_until: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub posted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
