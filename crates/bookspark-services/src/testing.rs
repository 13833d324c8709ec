//! In-memory stand-ins for the external collaborators.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use bookspark_types::models::Analysis;

use crate::analyzer::{AnalyzerError, ContentAnalyzer};
use crate::mailer::{Mailer, OutgoingEmail};
use crate::twitter::{BookmarkPage, BookmarkSource};

/// Captures every message instead of delivering it.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        if self.fail {
            return Err(anyhow!("mail provider unavailable"));
        }
        let mut sent = self.sent.lock().map_err(|_| anyhow!("mailer lock poisoned"))?;
        sent.push(email.clone());
        Ok(format!("msg_{}", sent.len()))
    }
}

/// Returns queued results in order, then a fixed analysis derived from the
/// content once the queue is empty.
#[derive(Default)]
pub struct ScriptedAnalyzer {
    queue: Mutex<VecDeque<Result<Analysis, String>>>,
    calls: AtomicUsize,
}

impl ScriptedAnalyzer {
    pub fn push_ok(&self, analysis: Analysis) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Ok(analysis));
        }
    }

    pub fn push_err(&self, message: &str) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(Err(message.to_string()));
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentAnalyzer for ScriptedAnalyzer {
    async fn analyze(&self, content: &str, _url: Option<&str>) -> Result<Analysis, AnalyzerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(analysis)) => Ok(analysis),
            Some(Err(message)) => Err(AnalyzerError::Format(message)),
            None => Ok(Analysis {
                summary: format!("Summary of {content}"),
                content_type: "tweet".to_string(),
                topics: vec!["general".to_string()],
                suggested_actions: vec!["Read later".to_string()],
            }),
        }
    }
}

/// Serves a fixed page, or an error when built with [`StaticSource::failing`].
#[derive(Default)]
pub struct StaticSource {
    page: Mutex<BookmarkPage>,
    fail: bool,
}

impl StaticSource {
    pub fn new(page: BookmarkPage) -> Self {
        Self {
            page: Mutex::new(page),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            page: Mutex::new(BookmarkPage::default()),
            fail: true,
        }
    }

    pub fn replace(&self, page: BookmarkPage) {
        if let Ok(mut p) = self.page.lock() {
            *p = page;
        }
    }
}

#[async_trait]
impl BookmarkSource for StaticSource {
    async fn fetch_bookmarks(
        &self,
        _access_token: &str,
        _provider_user_id: &str,
        max_results: u32,
    ) -> Result<BookmarkPage> {
        if self.fail {
            return Err(anyhow!("Twitter API error: 503 Service Unavailable"));
        }
        let mut page = self.page.lock().map_err(|_| anyhow!("source lock poisoned"))?.clone();
        page.data.truncate(max_results as usize);
        Ok(page)
    }
}
