//! Daily digest selection and delivery.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Timelike, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use bookspark_db::Database;
use bookspark_types::api::DigestStats;
use bookspark_types::models::{Bookmark, ContentType, User};

use crate::email::{DigestEmail, DigestItem, DigestRecipient, EmailService};
use crate::{Result, ServiceError, run_blocking};

pub const DEFAULT_DIGEST_LIMIT: usize = 5;
pub const DEFAULT_USER_DELAY: Duration = Duration::from_millis(500);
pub const CANDIDATE_WINDOW_DAYS: i64 = 7;

/// Result of one digest attempt for one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigestOutcome {
    Sent { bookmarks: usize },
    NotDue,
    NoBookmarks,
    Failed(String),
}

impl DigestOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn message(&self) -> String {
        match self {
            Self::Sent { bookmarks } => format!("Digest sent with {} bookmarks", bookmarks),
            Self::NotDue => "Not time for digest".to_string(),
            Self::NoBookmarks => "No bookmarks to send".to_string(),
            Self::Failed(reason) => reason.clone(),
        }
    }
}

/// Hour component of an `HH:MM:SS` digest time.
pub fn digest_hour(digest_time: &str) -> Option<u32> {
    digest_time
        .split(':')
        .next()
        .and_then(|h| h.trim().parse::<u32>().ok())
        .filter(|h| *h < 24)
}

/// Whether a digest should go out at `now`. Dates and hours are read in
/// `now`'s offset; the user's stored timezone is not consulted.
pub fn is_digest_due<Tz: TimeZone>(user: &User, now: &DateTime<Tz>) -> bool {
    if !user.digest_enabled {
        return false;
    }

    if let Some(last) = user.last_digest_sent {
        if last.with_timezone(&now.timezone()).date_naive() == now.date_naive() {
            return false;
        }
    }

    match digest_hour(&user.digest_time) {
        Some(hour) => now.hour().abs_diff(hour) <= 1,
        None => false,
    }
}

/// Pick up to `limit` bookmarks, preferring variety in topic and content
/// type, then filling remaining slots in candidate order.
pub fn select_for_digest(candidates: &[Bookmark], limit: usize) -> Vec<Bookmark> {
    let mut selected: Vec<&Bookmark> = Vec::with_capacity(limit);
    let mut seen_topics: HashSet<&str> = HashSet::new();
    let mut seen_types: HashSet<ContentType> = HashSet::new();

    for bookmark in candidates {
        if selected.len() >= limit {
            break;
        }
        let new_topic = bookmark.topics.iter().any(|t| !seen_topics.contains(t.as_str()));
        let new_type = !seen_types.contains(&bookmark.content_type);
        let has_actions = !bookmark.suggested_actions.is_empty();

        if (new_topic || new_type || selected.len() < 2) && has_actions {
            selected.push(bookmark);
            seen_topics.extend(bookmark.topics.iter().map(String::as_str));
            seen_types.insert(bookmark.content_type);
        }
    }

    for bookmark in candidates {
        if selected.len() >= limit {
            break;
        }
        if !selected.iter().any(|s| s.id == bookmark.id) {
            selected.push(bookmark);
        }
    }

    selected.into_iter().cloned().collect()
}

#[derive(Clone)]
pub struct DigestGenerator {
    db: Arc<Database>,
    email: Arc<EmailService>,
    limit: usize,
    user_delay: Duration,
}

impl DigestGenerator {
    pub fn new(db: Arc<Database>, email: Arc<EmailService>) -> Self {
        Self {
            db,
            email,
            limit: DEFAULT_DIGEST_LIMIT,
            user_delay: DEFAULT_USER_DELAY,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Pause between users in batch mode.
    pub fn with_user_delay(mut self, delay: Duration) -> Self {
        self.user_delay = delay;
        self
    }

    pub async fn generate_and_send(&self, user_id: Uuid) -> Result<DigestOutcome> {
        self.generate_and_send_at(user_id, Local::now().fixed_offset()).await
    }

    pub async fn generate_and_send_at(
        &self,
        user_id: Uuid,
        now: DateTime<FixedOffset>,
    ) -> Result<DigestOutcome> {
        let user = run_blocking(&self.db, move |db| db.get_user(user_id))
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".into()))?;

        if !is_digest_due(&user, &now) {
            return Ok(DigestOutcome::NotDue);
        }

        let now = now.with_timezone(&Utc);
        let since = now - chrono::Duration::days(CANDIDATE_WINDOW_DAYS);
        let pool_size = self.limit * 2;
        let candidates =
            run_blocking(&self.db, move |db| db.digest_candidates(user_id, since, pool_size)).await?;
        let selected = select_for_digest(&candidates, self.limit);

        if selected.is_empty() {
            run_blocking(&self.db, move |db| db.set_last_digest_sent(user_id, now)).await?;
            info!(%user_id, "No bookmarks to send");
            return Ok(DigestOutcome::NoBookmarks);
        }

        let Some(address) = user.digest_address() else {
            warn!(%user_id, "User has no email address");
            return Ok(DigestOutcome::Failed("No email address on file".into()));
        };

        let digest = DigestEmail {
            recipient: DigestRecipient {
                id: user.id.to_string(),
                name: user.display_name().to_string(),
                email: address.to_string(),
            },
            items: selected.iter().map(DigestItem::from).collect(),
            unsubscribe_url: self.email.unsubscribe_url(user.id, now),
        };

        if !self.email.send_daily_digest(&digest, now).await {
            return Ok(DigestOutcome::Failed("Failed to send digest email".into()));
        }

        let ids: Vec<Uuid> = selected.iter().map(|b| b.id).collect();
        let count = ids.len();
        run_blocking(&self.db, move |db| {
            db.set_last_digest_sent(user_id, now)?;
            db.mark_pending(&ids, now)
        })
        .await?;

        info!(%user_id, bookmarks = count, "Digest delivered");
        Ok(DigestOutcome::Sent { bookmarks: count })
    }

    pub async fn generate_for_all_users(&self) -> Result<DigestStats> {
        self.generate_for_all_users_at(Local::now().fixed_offset()).await
    }

    /// Run every digest-enabled user in turn. A per-user error counts as a
    /// failure and does not stop the batch.
    pub async fn generate_for_all_users_at(&self, now: DateTime<FixedOffset>) -> Result<DigestStats> {
        let users = run_blocking(&self.db, |db| db.digest_enabled_users()).await?;
        info!(users = users.len(), "Processing digests");

        let mut stats = DigestStats::default();
        for (i, user) in users.iter().enumerate() {
            if i > 0 && !self.user_delay.is_zero() {
                tokio::time::sleep(self.user_delay).await;
            }
            match self.generate_and_send_at(user.id, now).await {
                Ok(DigestOutcome::Sent { .. }) => stats.sent += 1,
                Ok(DigestOutcome::NotDue | DigestOutcome::NoBookmarks) => stats.skipped += 1,
                Ok(DigestOutcome::Failed(reason)) => {
                    warn!(user_id = %user.id, "Digest failed: {}", reason);
                    stats.failed += 1;
                }
                Err(e) => {
                    error!(user_id = %user.id, "Digest error: {}", e);
                    stats.failed += 1;
                }
            }
        }

        info!(
            sent = stats.sent,
            failed = stats.failed,
            skipped = stats.skipped,
            "Digest batch complete"
        );
        Ok(stats)
    }
}
