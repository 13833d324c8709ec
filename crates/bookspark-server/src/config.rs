use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use tracing::warn;

use bookspark_crypto::keys::generate_secret;

/// Secrets copied from `.env.example` that must be replaced.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub base_url: String,
    pub jwt_secret: String,
    pub link_secret: String,
    pub link_ttl_days: i64,
    pub bridge_secret: Option<String>,
    /// Zero disables the digest scheduler.
    pub digest_interval_secs: u64,
    pub mail_from: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub resend_api_key: Option<String>,
    pub twitter_api_base: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get("BOOKSPARK_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("Invalid BOOKSPARK_PORT '{}'", raw))?,
            None => 3000,
        };
        let link_ttl_days = match get("BOOKSPARK_LINK_TTL_DAYS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid BOOKSPARK_LINK_TTL_DAYS '{}'", raw))?,
            None => 14,
        };
        let digest_interval_secs = match get("BOOKSPARK_DIGEST_INTERVAL_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("Invalid BOOKSPARK_DIGEST_INTERVAL_SECS '{}'", raw))?,
            None => 3600,
        };

        let jwt_secret = secret_or_generated("BOOKSPARK_JWT_SECRET", get("BOOKSPARK_JWT_SECRET"));
        let link_secret = match get("BOOKSPARK_LINK_SECRET") {
            Some(secret) => checked_secret("BOOKSPARK_LINK_SECRET", secret),
            None => jwt_secret.clone(),
        };
        let bridge_secret = get("BOOKSPARK_BRIDGE_SECRET").map(|s| checked_secret("BOOKSPARK_BRIDGE_SECRET", s));
        if bridge_secret.is_none() {
            warn!("BOOKSPARK_BRIDGE_SECRET is not set; /auth/signin will refuse every request");
        }

        let openai_api_key = get("OPENAI_API_KEY");
        if openai_api_key.is_none() {
            warn!("OPENAI_API_KEY is not set; bookmarks will get fallback summaries");
        }
        let resend_api_key = get("RESEND_API_KEY");
        if resend_api_key.is_none() {
            warn!("RESEND_API_KEY is not set; digest emails will fail to send");
        }

        Ok(Self {
            host: get("BOOKSPARK_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("BOOKSPARK_DB_PATH").unwrap_or_else(|| "bookspark.db".into()).into(),
            base_url: get("BOOKSPARK_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            jwt_secret,
            link_secret,
            link_ttl_days,
            bridge_secret,
            digest_interval_secs,
            mail_from: get("BOOKSPARK_MAIL_FROM"),
            openai_api_key,
            openai_model: get("OPENAI_MODEL"),
            resend_api_key,
            twitter_api_base: get("TWITTER_API_BASE"),
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

fn secret_or_generated(key: &str, value: Option<String>) -> String {
    match value {
        Some(secret) => checked_secret(key, secret),
        None => {
            warn!("{} is not set; using a random secret, sessions will not survive a restart", key);
            generate_secret()
        }
    }
}

fn checked_secret(key: &str, secret: String) -> String {
    if PLACEHOLDER_SECRETS.contains(&secret.as_str()) {
        warn!("{} is still a placeholder value; set a real secret", key);
    }
    secret
}
