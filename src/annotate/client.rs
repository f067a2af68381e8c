//! Annotation client: primary provider with rate-limit retries, plus a sticky,
//! run-scoped failover to an optional secondary provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tracing::{info, warn};

use crate::annotate::error::AnnotateError;
use crate::annotate::providers::{GeminiProvider, OpenAiCompatProvider, Provider};
use crate::annotate::Annotator;
use crate::config::DigestConfig;

/// Waits between rate-limited attempts on the primary. One retry per entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(90),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn max_retries(&self) -> usize {
        self.delays.len()
    }
}

pub struct AnnotationClient {
    primary: Option<Arc<dyn Provider>>,
    secondary: Option<Arc<dyn Provider>>,
    /// true → USING_PRIMARY, false → USING_SECONDARY. Only ever goes true → false.
    primary_usable: AtomicBool,
    retry: RetryPolicy,
}

impl AnnotationClient {
    pub fn new(
        primary: Option<Arc<dyn Provider>>,
        secondary: Option<Arc<dyn Provider>>,
    ) -> Result<Self, AnnotateError> {
        if primary.is_none() && secondary.is_none() {
            return Err(AnnotateError::NotConfigured);
        }
        Ok(Self {
            primary_usable: AtomicBool::new(primary.is_some()),
            primary,
            secondary,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Gemini as primary when `GEMINI_API_KEY` is set, OpenAI-compatible as
    /// secondary when `OPENAI_API_KEY` is set.
    pub fn from_config(cfg: &DigestConfig) -> Result<Self, AnnotateError> {
        let primary: Option<Arc<dyn Provider>> = match cfg.gemini_api_key.as_deref() {
            Some(key) => Some(Arc::new(GeminiProvider::new(key, cfg.gemini_model.as_deref())?)),
            None => None,
        };
        let secondary: Option<Arc<dyn Provider>> = match cfg.openai_api_key.as_deref() {
            Some(key) => {
                let p = OpenAiCompatProvider::new(
                    key,
                    cfg.openai_api_base.as_deref(),
                    cfg.openai_model.as_deref(),
                )?;
                info!(
                    target: "digest",
                    base = %p.base_url(),
                    model = %p.model(),
                    "fallback provider configured"
                );
                Some(Arc::new(p))
            }
            None => None,
        };
        Self::new(primary, secondary)
    }

    /// Whether calls currently go to the primary provider.
    pub fn is_using_primary(&self) -> bool {
        self.primary.is_some() && self.primary_usable.load(Ordering::Acquire)
    }

    /// Name of the provider the next call will be routed to.
    pub fn active_provider(&self) -> &'static str {
        match (&self.primary, &self.secondary) {
            (Some(p), _) if self.is_using_primary() => p.name(),
            (_, Some(s)) => s.name(),
            _ => "none",
        }
    }

    async fn call_once(&self, provider: &dyn Provider, prompt: &str) -> Result<String, AnnotateError> {
        counter!("digest_llm_calls_total", "provider" => provider.name()).increment(1);
        provider.complete(prompt).await
    }

    /// Call the primary, sleeping and retrying on rate limits only.
    async fn call_with_retry(&self, provider: &dyn Provider, prompt: &str) -> Result<String, AnnotateError> {
        let max = self.retry.max_retries();
        let mut attempt = 0usize;
        loop {
            match self.call_once(provider, prompt).await {
                Err(AnnotateError::RateLimited { retry_after }) => {
                    counter!("digest_llm_rate_limited_total").increment(1);
                    if attempt >= max {
                        return Err(AnnotateError::RateLimitExhausted {
                            attempts: attempt + 1,
                        });
                    }
                    let wait = retry_after.unwrap_or(self.retry.delays[attempt]);
                    warn!(
                        target: "digest",
                        provider = provider.name(),
                        attempt = attempt + 1,
                        max_retries = max,
                        wait_secs = wait.as_secs_f64(),
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl Annotator for AnnotationClient {
    async fn call(&self, prompt: &str) -> Result<String, AnnotateError> {
        if let Some(primary) = &self.primary {
            if self.primary_usable.load(Ordering::Acquire) {
                match self.call_with_retry(primary.as_ref(), prompt).await {
                    Ok(text) => return Ok(text),
                    Err(e) => {
                        let Some(secondary) = &self.secondary else {
                            return Err(e);
                        };
                        // swap makes the transition idempotent across concurrent batches
                        if self.primary_usable.swap(false, Ordering::AcqRel) {
                            counter!("digest_llm_failover_total").increment(1);
                            warn!(
                                target: "digest",
                                from = primary.name(),
                                to = secondary.name(),
                                reason = %e,
                                "primary provider failed, using fallback for the rest of the run"
                            );
                        }
                        return self.call_once(secondary.as_ref(), prompt).await;
                    }
                }
            }
        }

        match &self.secondary {
            Some(secondary) => self.call_once(secondary.as_ref(), prompt).await,
            None => Err(AnnotateError::NotConfigured),
        }
    }
}
