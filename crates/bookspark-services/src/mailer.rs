use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://api.resend.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Hand the message to the provider. Returns the provider's message id.
    async fn send(&self, email: &OutgoingEmail) -> Result<String>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Resend transactional mail API.
pub struct ResendMailer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl ResendMailer {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("RESEND_API_KEY is not configured"))?;

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(api_key)
            .json(email)
            .send()
            .await
            .context("Mail request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Resend API error: {} - {}", status, body);
        }

        let sent: SendResponse = response.json().await.context("Invalid mail provider response")?;
        Ok(sent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn email() -> OutgoingEmail {
        OutgoingEmail {
            from: "BookSpark <digest@bookspark.app>".into(),
            to: vec!["ada@example.com".into()],
            subject: "Hello".into(),
            html: "<p>Hi</p>".into(),
            text: "Hi".into(),
            headers: BTreeMap::from([("List-Unsubscribe".to_string(), "<https://u>".to_string())]),
        }
    }

    #[tokio::test]
    async fn posts_to_resend() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({
                "to": ["ada@example.com"],
                "headers": { "List-Unsubscribe": "<https://u>" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "msg_1" })))
            .expect(1)
            .mount(&server)
            .await;

        let mailer = ResendMailer::new(Some("re_test".into())).with_base_url(server.uri());
        assert_eq!(mailer.send(&email()).await.unwrap(), "msg_1");
    }

    #[tokio::test]
    async fn provider_rejection_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid from"))
            .mount(&server)
            .await;

        let mailer = ResendMailer::new(Some("re_test".into())).with_base_url(server.uri());
        let err = mailer.send(&email()).await.unwrap_err();
        assert!(err.to_string().contains("422"), "{err}");
    }

    #[tokio::test]
    async fn missing_key_never_calls_out() {
        let mailer = ResendMailer::new(None).with_base_url("http://127.0.0.1:9");
        assert!(mailer.send(&email()).await.is_err());
    }
}
