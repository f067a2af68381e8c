use std::time::Duration;

/// Failures of a single annotation call.
#[derive(Debug, thiserror::Error)]
pub enum AnnotateError {
    #[error("no LLM provider configured; set GEMINI_API_KEY and/or OPENAI_API_KEY")]
    NotConfigured,

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("rate limit retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: usize },

    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
