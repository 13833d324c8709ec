use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bookspark_db::{Database, UpsertOutcome};

use crate::normalize::normalize_post;
use crate::twitter::BookmarkSource;
use crate::{Result, ServiceError, run_blocking};

pub const DEFAULT_MAX_RESULTS: u32 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub processed: usize,
    pub new: usize,
    pub updated: usize,
}

/// Pulls a user's bookmarks from the platform into the store.
#[derive(Clone)]
pub struct BookmarkSync {
    db: Arc<Database>,
    source: Arc<dyn BookmarkSource>,
    max_results: u32,
}

impl BookmarkSync {
    pub fn new(db: Arc<Database>, source: Arc<dyn BookmarkSource>) -> Self {
        Self {
            db,
            source,
            max_results: DEFAULT_MAX_RESULTS,
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    pub async fn sync_user(&self, user_id: Uuid) -> Result<SyncStats> {
        let user = run_blocking(&self.db, move |db| db.get_user(user_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".into()))?;

        let token = run_blocking(&self.db, move |db| db.get_access_token(user_id))
            .await?
            .ok_or_else(|| ServiceError::Auth("No token found for user".into()))?;

        let page = self
            .source
            .fetch_bookmarks(&token, &user.provider_id, self.max_results)
            .await
            .map_err(|e| ServiceError::Upstream(e.context("Failed to fetch bookmarks")))?;

        let authors: HashMap<&str, _> = page.includes.users.iter().map(|a| (a.id.as_str(), a)).collect();
        let media: HashMap<&str, _> = page
            .includes
            .media
            .iter()
            .map(|m| (m.media_key.as_str(), m))
            .collect();

        let now = Utc::now();
        let mut stats = SyncStats::default();

        for post in &page.data {
            let bookmark = normalize_post(user_id, post, &authors, &media);
            let external_id = post.id.clone();

            match run_blocking(&self.db, move |db| db.upsert_bookmark(&bookmark, now)).await {
                Ok((id, outcome)) => {
                    stats.processed += 1;
                    match outcome {
                        UpsertOutcome::Inserted => stats.new += 1,
                        UpsertOutcome::Updated => stats.updated += 1,
                    }
                    debug!(%id, external_id = %external_id, ?outcome, "Stored bookmark");
                }
                Err(e) => warn!(%user_id, external_id = %external_id, "Failed to store bookmark: {}", e),
            }
        }

        run_blocking(&self.db, move |db| db.touch_last_sync(user_id, now)).await?;

        info!(
            %user_id,
            processed = stats.processed,
            new = stats.new,
            updated = stats.updated,
            "Bookmark sync complete"
        );
        Ok(stats)
    }
}
