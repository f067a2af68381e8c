//! `digest`: fetch the configured feeds, score and summarize the recent items
//! with an LLM, and write a ranked markdown report.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use feed_digest::config::{load_sources, DigestConfig};
use feed_digest::ingest::http::HttpTransport;
use feed_digest::pipeline::{self, PipelineOptions};
use feed_digest::{report, Lang};

#[derive(Parser, Debug)]
#[command(name = "digest")]
#[command(about = "AI-ranked daily digest of RSS/Atom feeds")]
#[command(version)]
struct Cli {
    /// Recency window in hours (default 48)
    #[arg(long)]
    hours: Option<u32>,

    /// Number of items to keep in the report (default 15)
    #[arg(long = "top-n", short = 'n')]
    top_n: Option<usize>,

    /// Report and summary language
    #[arg(long, value_enum)]
    lang: Option<Lang>,

    /// Output file (default ./digest-YYYYMMDD.md)
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Feed list file (TOML or JSON)
    #[arg(long)]
    sources: Option<PathBuf>,

    /// Items per LLM call (1..=10)
    #[arg(long)]
    batch_size: Option<usize>,

    /// LLM calls in flight per wave
    #[arg(long)]
    batch_concurrency: Option<usize>,

    /// Feeds fetched in parallel per wave
    #[arg(long)]
    feed_concurrency: Option<usize>,
}

impl Cli {
    fn apply(self, mut cfg: DigestConfig) -> DigestConfig {
        if let Some(v) = self.hours {
            cfg.hours = v;
        }
        if let Some(v) = self.top_n {
            cfg.top_n = v;
        }
        if let Some(v) = self.lang {
            cfg.lang = v;
        }
        if let Some(v) = self.output {
            cfg.output = Some(v);
        }
        if let Some(v) = self.sources {
            cfg.sources_path = Some(v);
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.batch_concurrency {
            cfg.max_concurrent_batches = v;
        }
        if let Some(v) = self.feed_concurrency {
            cfg.feed_concurrency = v;
        }
        cfg.sanitized()
    }
}

/// Compact logs by default, JSON lines with DIGEST_LOG_JSON=1.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("feed_digest=info,digest=info,warn"));
    let json = std::env::var("DIGEST_LOG_JSON")
        .ok()
        .is_some_and(|v| v == "1");

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = cli.apply(DigestConfig::from_env()?);
    let client = pipeline::build_client(&cfg)?;
    info!(target: "digest", provider = client.active_provider(), "LLM client ready");

    let sources = load_sources(&cfg)?;
    let transport = HttpTransport::new()?;
    let now = Utc::now();

    let outcome = pipeline::run(
        &sources,
        &transport,
        &client,
        PipelineOptions::from(&cfg),
        now,
    )
    .await?;

    let markdown = report::render(
        &outcome.items,
        &outcome.highlights,
        &outcome.stats,
        cfg.lang,
        now,
    );
    let path = cfg.output_path(now.date_naive());
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    tokio::fs::write(&path, markdown)
        .await
        .with_context(|| format!("writing report to {}", path.display()))?;

    let s = &outcome.stats;
    info!(
        target: "digest",
        report = %path.display(),
        sources_ok = s.sources_ok,
        items = s.items_total,
        recent = s.items_filtered,
        selected = outcome.items.len(),
        "done"
    );
    for (i, a) in outcome.items.iter().take(3).enumerate() {
        let preview: String = a.summary.summary.chars().take(80).collect();
        info!(target: "digest", "top {}: {} | {preview}", i + 1, a.display_title());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(target: "digest", "fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}
