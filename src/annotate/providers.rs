//! Concrete LLM transports: Gemini (primary) and any OpenAI-compatible
//! chat-completions endpoint (secondary).
//!
//! Providers do a single HTTP round-trip and classify the outcome. Retrying and
//! failover are the client's job (`annotate::client`).

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::annotate::error::AnnotateError;

pub const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com/v1";
pub const OPENAI_DEFAULT_MODEL: &str = "gpt-4o-mini";

const LLM_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_ERROR_BODY: usize = 300;
/// Upper bound on a provider-supplied retry hint.
pub const MAX_RETRY_WAIT: Duration = Duration::from_secs(300);

/// Low-level provider: one remote call, no retries.
pub trait Provider: Send + Sync + 'static {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnnotateError>> + Send + 'a>>;
    /// Provider name for diagnostics/metrics.
    fn name(&self) -> &'static str;
}

fn http_client() -> Result<reqwest::Client, AnnotateError> {
    Ok(reqwest::Client::builder()
        .user_agent(concat!("feed-digest/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .timeout(LLM_TIMEOUT)
        .build()?)
}

fn trim_base(base: &str) -> String {
    base.trim().trim_end_matches('/').to_string()
}

/// Pick a sensible default model for an OpenAI-compatible base URL.
pub fn infer_openai_model(api_base: &str) -> &'static str {
    if api_base.to_ascii_lowercase().contains("deepseek") {
        "deepseek-chat"
    } else {
        OPENAI_DEFAULT_MODEL
    }
}

/// Extract a provider-supplied wait: `Retry-After` seconds first, then
/// "retry after 12s" / "retry in 7.5s" in the error body.
pub fn parse_retry_after(header: Option<&str>, body: &str) -> Option<Duration> {
    if let Some(secs) = header.and_then(|h| h.trim().parse::<f64>().ok()) {
        if let Some(wait) = bounded_wait(secs) {
            return Some(wait);
        }
    }
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE.get_or_init(|| {
        regex::Regex::new(r"(?i)retry\s+(?:after\s+|in\s+)([\d.]+)s").unwrap()
    });
    let secs: f64 = re.captures(body)?.get(1)?.as_str().parse().ok()?;
    bounded_wait(secs)
}

/// Seconds → Duration, rounded up to the millisecond and capped at `MAX_RETRY_WAIT`.
fn bounded_wait(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let ms = (secs.min(MAX_RETRY_WAIT.as_secs_f64()) * 1_000.0).ceil() as u64;
    Some(Duration::from_millis(ms))
}

fn truncate_error_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY {
        body.to_string()
    } else {
        let mut s: String = body.chars().take(MAX_ERROR_BODY).collect();
        s.push_str("...");
        s
    }
}

/// Turn a non-success response into the matching error. 429 is the only
/// status treated as a rate limit.
async fn classify_failure(provider: &'static str, resp: reqwest::Response) -> AnnotateError {
    let status = resp.status();
    let header = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AnnotateError::RateLimited {
            retry_after: parse_retry_after(header.as_deref(), &body),
        };
    }
    AnnotateError::Status {
        provider,
        status: status.as_u16(),
        body: truncate_error_body(&body),
    }
}

// ------------------------------------------------------------
// Gemini
// ------------------------------------------------------------

/// Google Gemini `generateContent` provider.
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: Option<&str>) -> Result<Self, AnnotateError> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
            base_url: GEMINI_DEFAULT_BASE.to_string(),
            model: model
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(GEMINI_DEFAULT_MODEL)
                .to_string(),
        })
    }

    /// Point the provider at another endpoint (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = trim_base(base_url);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, AnnotateError> {
        #[derive(Serialize)]
        struct Part<'a> {
            text: &'a str,
        }
        #[derive(Serialize)]
        struct Content<'a> {
            parts: Vec<Part<'a>>,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct GenerationConfig {
            temperature: f32,
            top_p: f32,
            top_k: u32,
        }
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Req<'a> {
            contents: Vec<Content<'a>>,
            generation_config: GenerationConfig,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            candidates: Vec<Candidate>,
        }
        #[derive(Deserialize)]
        struct Candidate {
            content: Option<CandidateContent>,
        }
        #[derive(Deserialize)]
        struct CandidateContent {
            #[serde(default)]
            parts: Vec<CandidatePart>,
        }
        #[derive(Deserialize)]
        struct CandidatePart {
            text: Option<String>,
        }

        let req = Req {
            contents: vec![Content {
                parts: vec![Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.8,
                top_k: 40,
            },
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(classify_failure(self.name(), resp).await);
        }

        // No candidate text (e.g. a safety block) is an empty answer, not a
        // provider failure: the batch parser turns it into defaults.
        let body: Resp = resp.json().await?;
        Ok(body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default())
    }
}

impl Provider for GeminiProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnnotateError>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ------------------------------------------------------------
// OpenAI-compatible
// ------------------------------------------------------------

/// Any `/chat/completions` endpoint (OpenAI, DeepSeek, local gateways).
pub struct OpenAiCompatProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompatProvider {
    /// `base_url`/`model` fall back to the OpenAI defaults; the model is
    /// inferred from the base when not given.
    pub fn new(
        api_key: impl Into<String>,
        base_url: Option<&str>,
        model: Option<&str>,
    ) -> Result<Self, AnnotateError> {
        let base_url = trim_base(
            base_url
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .unwrap_or(OPENAI_DEFAULT_BASE),
        );
        let model = model
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| infer_openai_model(&base_url).to_string());
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
            base_url,
            model,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn complete_impl(&self, prompt: &str) -> Result<String, AnnotateError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            top_p: f32,
        }
        #[derive(Deserialize)]
        struct Resp {
            #[serde(default)]
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Option<ChoiceMsg>,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<MsgContent>,
        }
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum MsgContent {
            Text(String),
            Parts(Vec<ContentPart>),
        }
        #[derive(Deserialize)]
        struct ContentPart {
            #[serde(rename = "type")]
            kind: Option<String>,
            text: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.3,
            top_p: 0.8,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(classify_failure(self.name(), resp).await);
        }

        let body: Resp = resp.json().await?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content);
        match content {
            Some(MsgContent::Text(s)) => Ok(s),
            Some(MsgContent::Parts(parts)) => Ok(parts
                .into_iter()
                .filter(|p| p.kind.as_deref() == Some("text"))
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n")),
            None => Ok(String::new()),
        }
    }
}

impl Provider for OpenAiCompatProvider {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, AnnotateError>> + Send + 'a>> {
        Box::pin(self.complete_impl(prompt))
    }
    fn name(&self) -> &'static str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn retry_after_prefers_header_then_body() {
        assert_eq!(
            parse_retry_after(Some("12"), "retry after 3s"),
            Some(Duration::from_secs(12))
        );
        assert_eq!(
            parse_retry_after(None, "Quota exceeded. Please retry in 7.5s."),
            Some(Duration::from_millis(7_500))
        );
        assert_eq!(
            parse_retry_after(Some("soon"), "Retry After 2s"),
            Some(Duration::from_secs(2))
        );
        assert_eq!(parse_retry_after(None, "slow down"), None);
    }

    #[test]
    fn oversized_retry_hints_are_capped() {
        assert_eq!(parse_retry_after(Some("1e20"), ""), Some(MAX_RETRY_WAIT));
        assert_eq!(
            parse_retry_after(None, "retry after 99999999999999999999s"),
            Some(MAX_RETRY_WAIT)
        );
        assert_eq!(parse_retry_after(Some("inf"), "retry in 2s"), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after(Some("-5"), ""), None);
    }

    #[test]
    fn openai_model_is_inferred_from_base() {
        assert_eq!(infer_openai_model("https://api.deepseek.com/v1"), "deepseek-chat");
        assert_eq!(infer_openai_model(OPENAI_DEFAULT_BASE), "gpt-4o-mini");

        let p = OpenAiCompatProvider::new("k", Some("https://api.DeepSeek.com/v1//"), None).unwrap();
        assert_eq!(p.base_url(), "https://api.DeepSeek.com/v1");
        assert_eq!(p.model(), "deepseek-chat");
    }

    #[tokio::test]
    async fn gemini_extracts_first_candidate_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "g-key"))
            .and(body_partial_json(serde_json::json!({
                "contents": [{"parts": [{"text": "hi"}]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [{"text": "hello back"}]}}]
            })))
            .mount(&server)
            .await;

        let p = GeminiProvider::new("g-key", None)
            .unwrap()
            .with_base_url(&server.uri());
        assert_eq!(p.complete("hi").await.unwrap(), "hello back");
    }

    #[tokio::test]
    async fn gemini_429_is_classified_as_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).set_body_string("Resource exhausted, retry in 4s"),
            )
            .mount(&server)
            .await;

        let p = GeminiProvider::new("g-key", None)
            .unwrap()
            .with_base_url(&server.uri());
        match p.complete("hi").await {
            Err(AnnotateError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(4)))
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn openai_compat_joins_text_parts_and_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer o-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": [
                    {"type": "text", "text": "line one"},
                    {"type": "image_url", "image_url": "x"},
                    {"type": "text", "text": "line two"}
                ]}}]
            })))
            .mount(&server)
            .await;

        let base = format!("{}/v1", server.uri());
        let p = OpenAiCompatProvider::new("o-key", Some(&base), Some("m")).unwrap();
        assert_eq!(p.complete("x").await.unwrap(), "line one\nline two");

        let failing = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&failing)
            .await;
        let p = OpenAiCompatProvider::new("o-key", Some(&failing.uri()), Some("m")).unwrap();
        match p.complete("x").await {
            Err(AnnotateError::Status { status, body, .. }) => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn blocked_or_null_answers_are_empty_not_errors() {
        let gemini = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [],
                "promptFeedback": {"blockReason": "SAFETY"}
            })))
            .mount(&gemini)
            .await;
        let p = GeminiProvider::new("g-key", None)
            .unwrap()
            .with_base_url(&gemini.uri());
        assert_eq!(p.complete("hi").await.unwrap(), "");

        let openai = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&openai)
            .await;
        let p = OpenAiCompatProvider::new("o-key", Some(&openai.uri()), Some("m")).unwrap();
        assert_eq!(p.complete("x").await.unwrap(), "");
    }
}
