// src/config/digest.rs
use anyhow::{anyhow, Context, Result};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::annotate::Lang;

pub const MAX_BATCH_SIZE: usize = 10;
pub const DEFAULT_RSSHUB_BASE: &str = "https://rsshub.app";

/// Everything the pipeline consumes. Built from the environment (`.env`
/// included), then overridden by CLI flags in `main`.
#[derive(Debug, Clone)]
pub struct DigestConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_api_base: Option<String>,
    pub openai_model: Option<String>,
    /// Recency window in hours.
    pub hours: u32,
    pub top_n: usize,
    pub lang: Lang,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub feed_concurrency: usize,
    pub feed_timeout: Duration,
    pub output: Option<PathBuf>,
    pub sources_path: Option<PathBuf>,
    pub rsshub_base_url: String,
    pub x_accounts: Vec<String>,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: None,
            openai_api_key: None,
            openai_api_base: None,
            openai_model: None,
            hours: 48,
            top_n: 15,
            lang: Lang::Zh,
            batch_size: MAX_BATCH_SIZE,
            max_concurrent_batches: 2,
            feed_concurrency: 10,
            feed_timeout: Duration::from_secs(15),
            output: None,
            sources_path: None,
            rsshub_base_url: DEFAULT_RSSHUB_BASE.to_string(),
            x_accounts: Vec::new(),
        }
    }
}

/// Non-empty, trimmed env var.
fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_opt(key)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid {key}={v:?}")))
        .transpose()
}

/// Comma-separated account list, `@` prefixes and blanks removed.
pub fn parse_accounts(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_start_matches('@').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl DigestConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            gemini_api_key: env_opt("GEMINI_API_KEY"),
            gemini_model: env_opt("GEMINI_MODEL"),
            openai_api_key: env_opt("OPENAI_API_KEY"),
            openai_api_base: env_opt("OPENAI_API_BASE"),
            openai_model: env_opt("OPENAI_MODEL"),
            sources_path: env_opt("DIGEST_SOURCES_PATH").map(PathBuf::from),
            x_accounts: env_opt("X_ACCOUNTS")
                .map(|v| parse_accounts(&v))
                .unwrap_or_default(),
            ..Self::default()
        };
        if let Some(base) = env_opt("RSSHUB_BASE_URL") {
            cfg.rsshub_base_url = base.trim_end_matches('/').to_string();
        }
        if let Some(v) = env_parse("DIGEST_HOURS")? {
            cfg.hours = v;
        }
        if let Some(v) = env_parse("DIGEST_TOP_N")? {
            cfg.top_n = v;
        }
        if let Some(v) = env_opt("DIGEST_LANG") {
            cfg.lang = match v.to_ascii_lowercase().as_str() {
                "zh" => Lang::Zh,
                "en" => Lang::En,
                other => return Err(anyhow!("invalid DIGEST_LANG={other:?} (expected zh|en)")),
            };
        }
        if let Some(v) = env_parse("DIGEST_BATCH_SIZE")? {
            cfg.batch_size = v;
        }
        if let Some(v) = env_parse("DIGEST_BATCH_CONCURRENCY")? {
            cfg.max_concurrent_batches = v;
        }
        if let Some(v) = env_parse("DIGEST_FEED_CONCURRENCY")? {
            cfg.feed_concurrency = v;
        }
        if let Some(v) = env_parse::<u64>("DIGEST_FEED_TIMEOUT_SECS")? {
            cfg.feed_timeout = Duration::from_secs(v);
        }
        Ok(cfg.sanitized())
    }

    /// Clamp knobs into workable ranges instead of failing the run.
    pub fn sanitized(mut self) -> Self {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            tracing::warn!(
                target: "digest",
                batch_size = self.batch_size,
                "batch size out of range, clamping to 1..={MAX_BATCH_SIZE}"
            );
            self.batch_size = self.batch_size.clamp(1, MAX_BATCH_SIZE);
        }
        self.max_concurrent_batches = self.max_concurrent_batches.max(1);
        self.feed_concurrency = self.feed_concurrency.max(1);
        self.hours = self.hours.max(1);
        self.top_n = self.top_n.max(1);
        if self.feed_timeout.is_zero() {
            self.feed_timeout = Duration::from_secs(15);
        }
        self
    }

    pub fn has_provider(&self) -> bool {
        self.gemini_api_key.is_some() || self.openai_api_key.is_some()
    }

    /// `./digest-YYYYMMDD.md` unless an output path was given.
    pub fn output_path(&self, today: chrono::NaiveDate) -> PathBuf {
        self.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("./digest-{}.md", today.format("%Y%m%d"))))
    }
}
