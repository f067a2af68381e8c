// src/annotate/mod.rs
//! LLM annotation: providers, the failover client, the batch scheduler, and
//! the three annotation passes (scoring, summaries, highlights).

pub mod batch;
pub mod client;
pub mod error;
pub mod highlights;
pub mod providers;
pub mod scoring;
pub mod summary;

use async_trait::async_trait;
use metrics::{describe_counter, describe_histogram};
use once_cell::sync::OnceCell;

pub use crate::annotate::batch::{annotate_batches, BatchEntry, BatchOptions};
pub use crate::annotate::client::{AnnotationClient, RetryPolicy};
pub use crate::annotate::error::AnnotateError;
pub use crate::annotate::scoring::{Category, ScoreResult};
pub use crate::annotate::summary::SummaryResult;

/// The one capability every stage needs: prompt in, text out.
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn call(&self, prompt: &str) -> Result<String, AnnotateError>;
}

/// Summary/highlight language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Zh,
    En,
}

impl Lang {
    pub fn instruction(self) -> &'static str {
        match self {
            Lang::Zh => "Write the translated title, summary and reason in Simplified Chinese, translating from English where needed.",
            Lang::En => "Write the translated title, summary and reason in English.",
        }
    }
}

pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_llm_calls_total", "LLM requests issued, by provider.");
        describe_counter!("digest_llm_rate_limited_total", "429 responses from the primary.");
        describe_counter!("digest_llm_failover_total", "Primary → fallback switches.");
        describe_counter!(
            "digest_batch_defaulted_total",
            "Batches whose items received the default annotation."
        );
        describe_histogram!("digest_batch_ms", "Per-batch annotation time in milliseconds.");
    });
}

/// Decode provider text as JSON. Models like to wrap payloads in ```json fences
/// even when told not to, so those are stripped first.
pub fn parse_json_response<T: serde::de::DeserializeOwned>(text: &str) -> serde_json::Result<T> {
    serde_json::from_str(strip_code_fence(text))
}

pub fn strip_code_fence(text: &str) -> &str {
    let t = text.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    // drop the info string (```json) up to the first newline
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest.trim_start_matches("json"),
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
