//! Client for the social platform's bookmarks endpoint.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use bookspark_types::models::{EngagementMetrics, MediaKind};

pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

const TWEET_FIELDS: &str = "created_at,author_id,public_metrics,entities,attachments";
const USER_FIELDS: &str = "name,username,profile_image_url,verified";
const MEDIA_FIELDS: &str = "url,preview_image_url,type";
const EXPANSIONS: &str = "author_id,attachments.media_keys";

/// One page of bookmarks with the authors and media it references.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookmarkPage {
    #[serde(default)]
    pub data: Vec<Post>,
    #[serde(default)]
    pub includes: Includes,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<Author>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Post {
    pub id: String,
    pub text: String,
    pub author_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub attachments: Option<Attachments>,
    pub entities: Option<Entities>,
    pub public_metrics: Option<EngagementMetrics>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Attachments {
    #[serde(default)]
    pub media_keys: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub urls: Vec<UrlEntity>,
}

/// A link span inside the post text. Offsets count characters.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlEntity {
    pub start: usize,
    pub end: usize,
    pub url: String,
    pub expanded_url: Option<String>,
    pub display_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub id: String,
    pub name: Option<String>,
    pub username: Option<String>,
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaItem {
    pub media_key: String,
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: Option<String>,
    pub preview_image_url: Option<String>,
}

#[async_trait]
pub trait BookmarkSource: Send + Sync {
    /// Fetch the first page of a user's bookmarks, newest first.
    async fn fetch_bookmarks(
        &self,
        access_token: &str,
        provider_user_id: &str,
        max_results: u32,
    ) -> Result<BookmarkPage>;
}

pub struct TwitterClient {
    client: Client,
    base_url: String,
}

impl TwitterClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for TwitterClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookmarkSource for TwitterClient {
    async fn fetch_bookmarks(
        &self,
        access_token: &str,
        provider_user_id: &str,
        max_results: u32,
    ) -> Result<BookmarkPage> {
        let url = format!("{}/2/users/{}/bookmarks", self.base_url, provider_user_id);
        let max_results = max_results.clamp(1, 100).to_string();

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[
                ("max_results", max_results.as_str()),
                ("tweet.fields", TWEET_FIELDS),
                ("user.fields", USER_FIELDS),
                ("media.fields", MEDIA_FIELDS),
                ("expansions", EXPANSIONS),
            ])
            .send()
            .await
            .context("Bookmarks request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Twitter API error: {} - {}", status, body);
        }

        response
            .json::<BookmarkPage>()
            .await
            .context("Invalid bookmarks response")
    }
}
