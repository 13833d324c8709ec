//! LLM-backed content analysis.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bookspark_types::models::Analysis;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 300;

const MAX_SUMMARY_CHARS: usize = 200;
const MAX_LIST_ITEMS: usize = 5;
const FALLBACK_SUMMARY_CHARS: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("OpenAI API key is not configured")]
    NotConfigured,
    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OpenAI API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("Invalid AI response format: {0}")]
    Format(String),
}

#[async_trait]
pub trait ContentAnalyzer: Send + Sync {
    async fn analyze(&self, content: &str, url: Option<&str>) -> Result<Analysis, AnalyzerError>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI chat-completions analyzer.
pub struct OpenAiAnalyzer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl OpenAiAnalyzer {
    /// A `None` key makes every call fail with [`AnalyzerError::NotConfigured`].
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl ContentAnalyzer for OpenAiAnalyzer {
    async fn analyze(&self, content: &str, url: Option<&str>) -> Result<Analysis, AnalyzerError> {
        let api_key = self.api_key.as_deref().ok_or(AnalyzerError::NotConfigured)?;
        let prompt = build_prompt(content, url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalyzerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_else(|| "{}".to_string());

        parse_analysis(&text)
    }
}

fn build_prompt(content: &str, url: Option<&str>) -> String {
    let url_line = url.map(|u| format!("URL: {u}")).unwrap_or_default();
    format!(
        r#"
Analyze this saved content and provide:
1. A 1-2 sentence summary that captures the main point
2. Content type (tweet, article, tutorial, inspiration, news, habit, etc.)
3. 2-3 relevant topic tags (lowercase, no spaces)
4. 3-5 suggested actions the user might want to take

Content: "{content}"
{url_line}

Respond in JSON format:
{{
  "summary": "Brief summary here",
  "contentType": "tweet",
  "topics": ["topic1", "topic2"],
  "suggestedActions": [
    "Add to task list",
    "Save for inspiration",
    "Set reminder to practice",
    "Research more about this topic",
    "Share with team"
  ]
}}

Keep suggestions specific and actionable. For tutorials, suggest "Add to task list" or "Set reminder to practice". For inspiration, suggest "Save for inspiration" or "Create similar content". For habits, suggest "Set daily reminder" or "Create routine".
"#
    )
}

/// Validate and clamp the model's JSON reply.
pub fn parse_analysis(text: &str) -> Result<Analysis, AnalyzerError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AnalyzerError::Format(e.to_string()))?;

    let summary = required_str(&value, "summary")?;
    let content_type = required_str(&value, "contentType")?;
    let topics = string_list(&value, "topics")?;
    let suggested_actions = string_list(&value, "suggestedActions")?;

    Ok(Analysis {
        summary: summary.chars().take(MAX_SUMMARY_CHARS).collect(),
        content_type: content_type.to_lowercase(),
        topics: topics.into_iter().take(MAX_LIST_ITEMS).collect(),
        suggested_actions: suggested_actions.into_iter().take(MAX_LIST_ITEMS).collect(),
    })
}

/// Placeholder stored when analysis fails, so the row is not picked up again.
pub fn fallback_analysis(content: &str) -> Analysis {
    let mut summary: String = content.chars().take(FALLBACK_SUMMARY_CHARS).collect();
    if content.chars().count() > FALLBACK_SUMMARY_CHARS {
        summary.push_str("...");
    }

    Analysis {
        summary,
        content_type: "unknown".to_string(),
        topics: Vec::new(),
        suggested_actions: vec!["Mark as done".to_string(), "Save for later".to_string()],
    }
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line
    let body = rest.split_once('\n').map(|(_, b)| b).unwrap_or(rest);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn required_str<'a>(value: &'a Value, field: &str) -> Result<&'a str, AnalyzerError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| AnalyzerError::Format(format!("missing or empty '{field}'")))
}

fn string_list(value: &Value, field: &str) -> Result<Vec<String>, AnalyzerError> {
    let items = value
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| AnalyzerError::Format(format!("'{field}' must be an array")))?;

    items
        .iter()
        .map(|item| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| AnalyzerError::Format(format!("'{field}' must contain only strings")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parses_and_clamps() {
        let long_summary = "s".repeat(250);
        let text = json!({
            "summary": long_summary,
            "contentType": "Tutorial",
            "topics": ["a", "b", "c", "d", "e", "f"],
            "suggestedActions": ["Add to task list"]
        })
        .to_string();

        let analysis = parse_analysis(&text).unwrap();
        assert_eq!(analysis.summary.chars().count(), 200);
        assert_eq!(analysis.content_type, "tutorial");
        assert_eq!(analysis.topics, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(analysis.suggested_actions, vec!["Add to task list"]);
    }

    #[test]
    fn accepts_fenced_json() {
        let text = "```json\n{\"summary\":\"x\",\"contentType\":\"news\",\"topics\":[],\"suggestedActions\":[]}\n```";
        assert_eq!(parse_analysis(text).unwrap().content_type, "news");
    }

    #[test]
    fn rejects_wrong_shapes() {
        let cases = [
            "not json",
            r#"{"contentType":"news","topics":[],"suggestedActions":[]}"#,
            r#"{"summary":"","contentType":"news","topics":[],"suggestedActions":[]}"#,
            r#"{"summary":"x","contentType":"news","topics":"ai","suggestedActions":[]}"#,
            r#"{"summary":"x","contentType":"news","topics":[1],"suggestedActions":[]}"#,
            r#"{"summary":"x","contentType":"news","topics":[]}"#,
        ];
        for text in cases {
            assert!(matches!(parse_analysis(text), Err(AnalyzerError::Format(_))), "{text}");
        }
    }

    #[test]
    fn fallback_truncates_long_content() {
        let short = fallback_analysis("hello");
        assert_eq!(short.summary, "hello");
        assert_eq!(short.content_type, "unknown");
        assert!(short.topics.is_empty());
        assert_eq!(short.suggested_actions, vec!["Mark as done", "Save for later"]);

        let long = fallback_analysis(&"é".repeat(150));
        assert_eq!(long.summary.chars().count(), 103);
        assert!(long.summary.ends_with("..."));
    }

    #[tokio::test]
    async fn missing_key_fails_fast() {
        let analyzer = OpenAiAnalyzer::new(None);
        assert!(matches!(
            analyzer.analyze("text", None).await,
            Err(AnalyzerError::NotConfigured)
        ));
        let blank = OpenAiAnalyzer::new(Some("  ".into()));
        assert!(matches!(blank.analyze("text", None).await, Err(AnalyzerError::NotConfigured)));
    }

    #[tokio::test]
    async fn calls_chat_completions() {
        let server = MockServer::start().await;
        let reply = json!({
            "summary": "A guide to async Rust",
            "contentType": "tutorial",
            "topics": ["rust", "async"],
            "suggestedActions": ["Add to task list", "Set reminder to practice"]
        });
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({ "model": "gpt-3.5-turbo", "max_tokens": 300 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": reply.to_string() } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let analyzer = OpenAiAnalyzer::new(Some("sk-test".into())).with_base_url(server.uri());
        let analysis = analyzer
            .analyze("How to write async Rust", Some("https://example.com"))
            .await
            .unwrap();

        assert_eq!(analysis.summary, "A guide to async Rust");
        assert_eq!(analysis.topics, vec!["rust", "async"]);
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let analyzer = OpenAiAnalyzer::new(Some("sk-test".into())).with_base_url(server.uri());
        match analyzer.analyze("text", None).await {
            Err(AnalyzerError::Api { status, body }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }
}
