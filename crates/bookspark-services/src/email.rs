//! Digest rendering and delivery.

use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use bookspark_crypto::LinkSigner;
use bookspark_types::models::{Bookmark, UnknownVariant};

use crate::mailer::{Mailer, OutgoingEmail};

pub const DEFAULT_FROM: &str = "BookSpark <digest@bookspark.app>";

const PREVIEW_CHARS: usize = 150;

const STYLE: &str = r#"
    body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; margin: 0; padding: 0; background-color: #f8fafc; }
    .container { max-width: 600px; margin: 0 auto; background: white; }
    .header { background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); padding: 32px 24px; text-align: center; }
    .header h1 { color: white; margin: 0; font-size: 28px; }
    .header p { color: rgba(255,255,255,0.9); margin: 8px 0 0 0; }
    .content { padding: 32px 24px; }
    .greeting { font-size: 18px; margin-bottom: 24px; color: #1f2937; }
    .stats { background: #eff6ff; padding: 16px; border-radius: 8px; margin-bottom: 24px; text-align: center; }
    .stats-number { font-size: 24px; font-weight: 700; color: #1d4ed8; }
    .stats-label { color: #6b7280; font-size: 14px; }
    .bookmark { border: 1px solid #e5e7eb; border-radius: 12px; padding: 20px; margin-bottom: 20px; background: #fafafa; }
    .author { color: #6b7280; font-size: 14px; }
    .summary { font-size: 16px; font-weight: 600; color: #1f2937; margin: 12px 0; }
    .preview { color: #4b5563; font-size: 14px; margin-bottom: 16px; }
    .topic { display: inline-block; background: #ddd6fe; color: #5b21b6; padding: 4px 8px; border-radius: 6px; font-size: 12px; margin: 0 6px 4px 0; }
    .action-btn { display: inline-block; padding: 8px 16px; background: #3b82f6; color: white; text-decoration: none; border-radius: 6px; font-size: 14px; margin-right: 8px; }
    .action-btn.secondary { background: #6b7280; }
    .all-btn { display: inline-block; padding: 12px 24px; background: #059669; color: white; text-decoration: none; border-radius: 8px; font-weight: 600; }
    .footer { padding: 24px; text-align: center; border-top: 1px solid #e5e7eb; background: #f9fafb; color: #6b7280; font-size: 14px; }
    .footer a { color: #3b82f6; text-decoration: none; }
"#;

/// One-click actions carried by digest links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAction {
    Done,
    Snooze,
    View,
}

impl DigestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Snooze => "snooze",
            Self::View => "view",
        }
    }
}

impl fmt::Display for DigestAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DigestAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(Self::Done),
            "snooze" => Ok(Self::Snooze),
            "view" => Ok(Self::View),
            other => Err(UnknownVariant {
                kind: "action",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DigestRecipient {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct DigestItem {
    pub id: String,
    pub content: String,
    pub summary: String,
    pub author_name: Option<String>,
    pub author_username: Option<String>,
    pub topics: Vec<String>,
    pub suggested_actions: Vec<String>,
    pub content_type: String,
}

impl DigestItem {
    fn byline(&self) -> &str {
        self.author_username
            .as_deref()
            .or(self.author_name.as_deref())
            .unwrap_or("unknown")
    }

    fn preview(&self) -> String {
        if self.content.chars().count() > PREVIEW_CHARS {
            let mut s: String = self.content.chars().take(PREVIEW_CHARS).collect();
            s.push_str("...");
            s
        } else {
            self.content.clone()
        }
    }
}

impl From<&Bookmark> for DigestItem {
    fn from(b: &Bookmark) -> Self {
        Self {
            id: b.id.to_string(),
            content: b.content.clone(),
            summary: b.summary.clone().unwrap_or_else(|| b.cleaned_content.clone()),
            author_name: b.author_name.clone(),
            author_username: b.author_username.clone(),
            topics: b.topics.clone(),
            suggested_actions: b.suggested_actions.clone(),
            content_type: b.content_type.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DigestEmail {
    pub recipient: DigestRecipient,
    pub items: Vec<DigestItem>,
    pub unsubscribe_url: String,
}

pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    links: LinkSigner,
    base_url: String,
    from: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, links: LinkSigner, base_url: impl Into<String>) -> Self {
        Self {
            mailer,
            links,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            from: DEFAULT_FROM.to_string(),
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn dashboard_url(&self) -> String {
        format!("{}/dashboard", self.base_url)
    }

    /// Signed one-click link. Ids that cannot be encoded fall back to the
    /// dashboard.
    pub fn action_link(
        &self,
        user_id: &str,
        bookmark_id: &str,
        action: DigestAction,
        now: DateTime<Utc>,
    ) -> String {
        match self.links.action_token(user_id, bookmark_id, action.as_str(), now) {
            Ok(token) => format!("{}/api/digest/action?token={}", self.base_url, token),
            Err(e) => {
                warn!(user_id, bookmark_id, "Cannot sign action link: {}", e);
                self.dashboard_url()
            }
        }
    }

    pub fn unsubscribe_url(&self, user_id: Uuid, now: DateTime<Utc>) -> String {
        match self.links.unsubscribe_token(&user_id.to_string(), now) {
            Ok(token) => format!("{}/api/digest/unsubscribe?token={}", self.base_url, token),
            Err(e) => {
                warn!(%user_id, "Cannot sign unsubscribe link: {}", e);
                format!("{}/settings", self.base_url)
            }
        }
    }

    pub fn subject(count: usize) -> String {
        format!(
            "📚 Your Daily BookSpark Digest - {} bookmark{} ready",
            count,
            if count == 1 { "" } else { "s" }
        )
    }

    pub fn render_html(&self, digest: &DigestEmail, now: DateTime<Utc>) -> String {
        let user_id = &digest.recipient.id;
        let mut html = String::with_capacity(8 * 1024);

        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n  <meta charset=\"utf-8\">\n");
        html.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
        html.push_str("  <title>Your Daily BookSpark Digest</title>\n  <style>");
        html.push_str(STYLE);
        html.push_str("  </style>\n</head>\n<body>\n<div class=\"container\">\n");
        html.push_str("  <div class=\"header\"><h1>📚 BookSpark</h1><p>Your daily dose of saved wisdom</p></div>\n");
        html.push_str("  <div class=\"content\">\n");
        let _ = writeln!(
            html,
            "    <div class=\"greeting\">Good morning, {}! 👋</div>",
            html_escape(&digest.recipient.name)
        );
        let _ = writeln!(
            html,
            "    <div class=\"stats\"><div class=\"stats-number\">{}</div>\
             <div class=\"stats-label\">bookmarks ready for action today</div></div>",
            digest.items.len()
        );

        for item in &digest.items {
            html.push_str("    <div class=\"bookmark\">\n");
            let _ = writeln!(html, "      <div class=\"author\">@{}</div>", html_escape(item.byline()));
            let _ = writeln!(html, "      <div class=\"summary\">{}</div>", html_escape(&item.summary));
            let _ = writeln!(html, "      <div class=\"preview\">{}</div>", html_escape(&item.preview()));

            if !item.topics.is_empty() {
                html.push_str("      <div class=\"topics\">");
                for topic in &item.topics {
                    let _ = write!(html, "<span class=\"topic\">{}</span>", html_escape(topic));
                }
                html.push_str("</div>\n");
            }

            html.push_str("      <div class=\"actions\">\n");
            for (action, label, class) in [
                (DigestAction::Done, "✅ Mark Done", "action-btn"),
                (DigestAction::Snooze, "⏰ Snooze 7 days", "action-btn secondary"),
                (DigestAction::View, "👀 View", "action-btn secondary"),
            ] {
                let href = self.action_link(user_id, &item.id, action, now);
                let _ = writeln!(
                    html,
                    "        <a href=\"{}\" class=\"{}\">{}</a>",
                    html_escape(&href),
                    class,
                    label
                );
            }
            html.push_str("      </div>\n    </div>\n");
        }

        let _ = writeln!(
            html,
            "    <div style=\"text-align: center; margin-top: 32px;\"><a class=\"all-btn\" href=\"{}\">View All Bookmarks</a></div>",
            html_escape(&self.dashboard_url())
        );
        html.push_str("  </div>\n  <div class=\"footer\">\n");
        html.push_str("    <p>You're receiving this because you have BookSpark digest emails enabled.</p>\n");
        let _ = writeln!(
            html,
            "    <p><a href=\"{}\">Unsubscribe</a> | <a href=\"{}/settings\">Email Preferences</a></p>",
            html_escape(&digest.unsubscribe_url),
            html_escape(&self.base_url)
        );
        html.push_str("    <p>BookSpark - Turn your bookmarks into actionable outcomes</p>\n");
        html.push_str("  </div>\n</div>\n</body>\n</html>\n");
        html
    }

    pub fn render_text(&self, digest: &DigestEmail, now: DateTime<Utc>) -> String {
        let user_id = &digest.recipient.id;
        let mut text = String::new();

        let _ = writeln!(text, "BookSpark Daily Digest - {}\n", now.format("%B %-d, %Y"));
        let _ = writeln!(text, "Hello {}!\n", digest.recipient.name);
        let _ = writeln!(
            text,
            "You have {} bookmarks ready for action today:\n",
            digest.items.len()
        );

        for (i, item) in digest.items.iter().enumerate() {
            let topics = if item.topics.is_empty() {
                "None".to_string()
            } else {
                item.topics.join(", ")
            };
            let _ = writeln!(text, "{}. {}", i + 1, item.summary);
            let _ = writeln!(text, "   From: @{}", item.byline());
            let _ = writeln!(text, "   Topics: {}\n", topics);
            let _ = writeln!(text, "   Quick Actions:");
            let _ = writeln!(
                text,
                "   - Mark Done: {}",
                self.action_link(user_id, &item.id, DigestAction::Done, now)
            );
            let _ = writeln!(
                text,
                "   - Snooze: {}",
                self.action_link(user_id, &item.id, DigestAction::Snooze, now)
            );
            let _ = writeln!(
                text,
                "   - View: {}\n",
                self.action_link(user_id, &item.id, DigestAction::View, now)
            );
        }

        let _ = writeln!(text, "View all bookmarks: {}\n", self.dashboard_url());
        text.push_str("---\nBookSpark - Turn your bookmarks into actionable outcomes\n");
        let _ = writeln!(text, "Unsubscribe: {}", digest.unsubscribe_url);
        text
    }

    pub fn build_message(&self, digest: &DigestEmail, now: DateTime<Utc>) -> OutgoingEmail {
        OutgoingEmail {
            from: self.from.clone(),
            to: vec![digest.recipient.email.clone()],
            subject: Self::subject(digest.items.len()),
            html: self.render_html(digest, now),
            text: self.render_text(digest, now),
            headers: BTreeMap::from([(
                "List-Unsubscribe".to_string(),
                format!("<{}>", digest.unsubscribe_url),
            )]),
        }
    }

    /// Returns true when the message was accepted, or when there was
    /// nothing to send.
    pub async fn send_daily_digest(&self, digest: &DigestEmail, now: DateTime<Utc>) -> bool {
        if digest.items.is_empty() {
            info!(user_id = %digest.recipient.id, "No bookmarks to send");
            return true;
        }

        let message = self.build_message(digest, now);
        match self.mailer.send(&message).await {
            Ok(id) => {
                info!(to = %digest.recipient.email, message_id = %id, "Digest sent");
                true
            }
            Err(e) => {
                error!(to = %digest.recipient.email, "Failed to send digest: {:#}", e);
                false
            }
        }
    }

    /// Send a fixed two-item sample digest.
    pub async fn send_test_digest(&self, email: &str, name: &str) -> bool {
        let digest = DigestEmail {
            recipient: DigestRecipient {
                id: "test-user".to_string(),
                name: name.to_string(),
                email: email.to_string(),
            },
            items: sample_items(),
            unsubscribe_url: format!("{}/settings", self.base_url),
        };
        self.send_daily_digest(&digest, Utc::now()).await
    }
}

fn sample_items() -> Vec<DigestItem> {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    vec![
        DigestItem {
            id: "test-1".to_string(),
            content: "Just shipped a new feature using Next.js 15! The app directory is incredibly \
                      powerful for building modern web applications."
                .to_string(),
            summary: "Developer shares excitement about Next.js 15 app directory features".to_string(),
            author_name: Some("Sarah Chen".to_string()),
            author_username: Some("sarahcodes".to_string()),
            topics: strings(&["development", "nextjs", "web"]),
            suggested_actions: strings(&["Add to learning list", "Try Next.js 15", "Follow up on app directory"]),
            content_type: "tweet".to_string(),
        },
        DigestItem {
            id: "test-2".to_string(),
            content: "The key to productivity is not working harder, but working on the right \
                      things. Focus beats speed every time."
                .to_string(),
            summary: "Productivity insight about focusing on the right priorities".to_string(),
            author_name: Some("Alex Morgan".to_string()),
            author_username: Some("alexproductivity".to_string()),
            topics: strings(&["productivity", "focus", "mindset"]),
            suggested_actions: strings(&["Reflect on current priorities", "Create focus framework", "Share with team"]),
            content_type: "tweet".to_string(),
        },
    ]
}

pub fn html_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
