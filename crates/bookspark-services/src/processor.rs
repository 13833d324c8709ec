use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use bookspark_db::Database;
use bookspark_types::models::Bookmark;

use crate::analyzer::{ContentAnalyzer, fallback_analysis};
use crate::{Result, ServiceError, run_blocking};

pub const DEFAULT_ANALYZER_DELAY: Duration = Duration::from_secs(1);

/// Runs unanalyzed bookmarks through the content analyzer.
#[derive(Clone)]
pub struct ContentProcessor {
    db: Arc<Database>,
    analyzer: Arc<dyn ContentAnalyzer>,
    delay: Duration,
}

impl ContentProcessor {
    pub fn new(db: Arc<Database>, analyzer: Arc<dyn ContentAnalyzer>) -> Self {
        Self {
            db,
            analyzer,
            delay: DEFAULT_ANALYZER_DELAY,
        }
    }

    /// Pause between analyzer calls within a batch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Analyze up to `batch_size` unprocessed bookmarks, oldest first.
    /// Returns how many were analyzed successfully; rows that got the
    /// fallback are marked processed but not counted.
    pub async fn process_batch(&self, batch_size: usize, user_id: Option<Uuid>) -> Result<usize> {
        let pending = run_blocking(&self.db, move |db| db.unprocessed_bookmarks(batch_size, user_id)).await?;
        if pending.is_empty() {
            debug!("No unprocessed bookmarks");
            return Ok(0);
        }

        info!(count = pending.len(), "Processing bookmarks");
        let mut analyzed = 0;

        for (i, bookmark) in pending.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match self.analyze_and_store(bookmark).await {
                Ok(true) => analyzed += 1,
                Ok(false) => {}
                Err(e) => error!(bookmark_id = %bookmark.id, "Failed to store analysis: {}", e),
            }
        }

        info!("Analyzed {}/{} bookmarks", analyzed, pending.len());
        Ok(analyzed)
    }

    /// Analyze a single bookmark whether or not it was processed before.
    pub async fn process_one(&self, bookmark_id: Uuid) -> Result<bool> {
        let bookmark = run_blocking(&self.db, move |db| db.get_bookmark(bookmark_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound("Bookmark not found".into()))?;
        self.analyze_and_store(&bookmark).await
    }

    /// Drop the stored analysis and run the analyzer again.
    pub async fn reprocess(&self, bookmark_id: Uuid) -> Result<bool> {
        let now = Utc::now();
        let cleared = run_blocking(&self.db, move |db| db.clear_analysis(bookmark_id, now)).await?;
        if !cleared {
            return Err(ServiceError::NotFound("Bookmark not found".into()));
        }
        self.process_one(bookmark_id).await
    }

    /// Ok(true) when the analyzer succeeded, Ok(false) when the fallback
    /// was stored instead.
    async fn analyze_and_store(&self, bookmark: &Bookmark) -> Result<bool> {
        let (analysis, succeeded) = match self.analyzer.analyze(&bookmark.content, bookmark.url.as_deref()).await {
            Ok(analysis) => (analysis, true),
            Err(e) => {
                warn!(bookmark_id = %bookmark.id, "Analysis failed, storing fallback: {}", e);
                (fallback_analysis(&bookmark.content), false)
            }
        };

        let id = bookmark.id;
        let now = Utc::now();
        run_blocking(&self.db, move |db| db.save_analysis(id, &analysis, now)).await?;

        if succeeded {
            debug!(bookmark_id = %id, "Stored analysis");
        }
        Ok(succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAnalyzer;
    use bookspark_db::{NewBookmark, SignInProfile};
    use bookspark_types::models::{Analysis, ContentType, EngagementMetrics};

    fn seed(db: &Database, count: usize) -> (Uuid, Vec<Uuid>) {
        let user = db
            .upsert_user(
                &SignInProfile {
                    provider_id: "42".into(),
                    ..Default::default()
                },
                Utc::now(),
            )
            .unwrap();
        let ids = (0..count)
            .map(|i| {
                let (id, _) = db
                    .upsert_bookmark(
                        &NewBookmark {
                            user_id: user.id,
                            external_id: format!("post-{i}"),
                            content: format!("content {i}"),
                            cleaned_content: format!("content {i}"),
                            author_name: None,
                            author_username: None,
                            author_avatar_url: None,
                            author_verified: false,
                            url: None,
                            expanded_urls: vec![],
                            media: vec![],
                            metrics: EngagementMetrics::default(),
                            content_type: ContentType::Tweet,
                            posted_at: None,
                        },
                        Utc::now(),
                    )
                    .unwrap();
                id
            })
            .collect();
        (user.id, ids)
    }

    fn processor(db: Arc<Database>, analyzer: Arc<ScriptedAnalyzer>) -> ContentProcessor {
        ContentProcessor::new(db, analyzer).with_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn failure_stores_fallback_and_is_not_retried() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (_, ids) = seed(&db, 3);
        let analyzer = Arc::new(ScriptedAnalyzer::default());
        analyzer.push_ok(Analysis {
            summary: "one".into(),
            content_type: "news".into(),
            topics: vec!["a".into()],
            suggested_actions: vec!["Read".into()],
        });
        analyzer.push_err("garbled");

        let p = processor(db.clone(), analyzer.clone());
        assert_eq!(p.process_batch(10, None).await.unwrap(), 2);
        assert_eq!(analyzer.calls(), 3);

        let failed = db.get_bookmark(ids[1]).unwrap().unwrap();
        assert_eq!(failed.summary.as_deref(), Some("content 1"));
        assert_eq!(failed.category.as_deref(), Some("unknown"));
        assert!(failed.processed_at.is_some());

        // Every row is processed now; nothing is picked up again
        assert_eq!(p.process_batch(10, None).await.unwrap(), 0);
        assert_eq!(analyzer.calls(), 3);
    }

    #[tokio::test]
    async fn store_failure_skips_the_row_and_continues() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (_, ids) = seed(&db, 3);
        db.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TRIGGER reject_analysis BEFORE UPDATE OF processed_at ON bookmarks
                 WHEN NEW.external_id = 'post-1'
                 BEGIN SELECT RAISE(ABORT, 'analysis rejected'); END;",
            )?;
            Ok(())
        })
        .unwrap();

        let analyzer = Arc::new(ScriptedAnalyzer::default());
        let p = processor(db.clone(), analyzer.clone());
        assert_eq!(p.process_batch(10, None).await.unwrap(), 2);
        assert_eq!(analyzer.calls(), 3);

        assert!(db.get_bookmark(ids[0]).unwrap().unwrap().processed_at.is_some());
        assert!(db.get_bookmark(ids[1]).unwrap().unwrap().processed_at.is_none());
        assert!(db.get_bookmark(ids[2]).unwrap().unwrap().processed_at.is_some());
    }

    #[tokio::test]
    async fn batch_size_and_user_scope() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (user_id, _) = seed(&db, 4);
        let analyzer = Arc::new(ScriptedAnalyzer::default());
        let p = processor(db.clone(), analyzer.clone());

        assert_eq!(p.process_batch(10, Some(Uuid::new_v4())).await.unwrap(), 0);
        assert_eq!(p.process_batch(3, Some(user_id)).await.unwrap(), 3);
        assert_eq!(db.unprocessed_bookmarks(10, None).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reprocess_replaces_the_analysis() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (_, ids) = seed(&db, 1);
        let analyzer = Arc::new(ScriptedAnalyzer::default());
        analyzer.push_err("down");
        let p = processor(db.clone(), analyzer.clone());

        assert!(!p.process_one(ids[0]).await.unwrap());
        assert!(p.reprocess(ids[0]).await.unwrap());

        let b = db.get_bookmark(ids[0]).unwrap().unwrap();
        assert_eq!(b.summary.as_deref(), Some("Summary of content 0"));
        assert_eq!(b.topics, vec!["general"]);
    }

    #[tokio::test]
    async fn unknown_bookmark_is_not_found() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let p = processor(db, Arc::new(ScriptedAnalyzer::default()));
        assert!(matches!(p.process_one(Uuid::new_v4()).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(p.reprocess(Uuid::new_v4()).await, Err(ServiceError::NotFound(_))));
    }
}
