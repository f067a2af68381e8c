// src/ingest/mod.rs
pub mod http;
pub mod parser;
pub mod types;

use crate::ingest::parser::{parse_feed, parse_published};
use crate::ingest::types::{FeedTransport, Item, Source};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::join_all;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::time::{Duration, Instant};

/// One-time metrics registration (so series show up in any installed recorder).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("digest_items_fetched_total", "Items parsed from all sources.");
        describe_counter!(
            "digest_source_errors_total",
            "Sources that failed, timed out or produced no items."
        );
        describe_counter!("digest_source_timeouts_total", "Sources cancelled by timeout.");
        describe_counter!(
            "digest_source_http_status_errors_total",
            "Feed responses with a non-2xx status."
        );
        describe_histogram!("digest_fetch_ms", "Per-source fetch + parse time in milliseconds.");
    });
}

/// Normalize feed text: decode entities, strip tags, collapse whitespace, cap length.
pub fn normalize_text(s: &str, max_chars: usize) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 4) Length cap
    if out.chars().count() > max_chars {
        out = out.chars().take(max_chars).collect();
    }

    out
}

/// Result of fetching every configured source.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub items: Vec<Item>,
    pub sources_total: usize,
    /// Sources that produced at least one item.
    pub sources_ok: usize,
    pub sources_failed: usize,
}

/// Fetch a single source, bounded by `timeout`. Every failure mode collapses to
/// an empty list here; nothing escapes to sibling sources.
pub async fn fetch_source(
    source: &Source,
    transport: &dyn FeedTransport,
    timeout: Duration,
) -> Vec<Item> {
    let t0 = Instant::now();
    let body = match tokio::time::timeout(timeout, transport.get(&source.locator)).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => {
            tracing::warn!(target: "digest", source = %source.name, error = %e, "source failed");
            return Vec::new();
        }
        Err(_) => {
            tracing::warn!(
                target: "digest",
                source = %source.name,
                timeout_ms = timeout.as_millis() as u64,
                "source timed out"
            );
            counter!("digest_source_timeouts_total").increment(1);
            return Vec::new();
        }
    };

    let items: Vec<Item> = parse_feed(&body)
        .into_iter()
        .map(|e| Item {
            title: e.title,
            link: e.link,
            published_at: parse_published(&e.published),
            body: e.description,
            source_name: source.name.clone(),
            source_display: source.display_locator.clone(),
        })
        .collect();

    histogram!("digest_fetch_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    if items.is_empty() {
        tracing::debug!(target: "digest", source = %source.name, "source produced no items");
    }
    items
}

/// Fetch all sources in waves of `concurrency`. Each wave settles completely
/// before the next one is dispatched, so at most `concurrency` requests are in
/// flight at any time.
pub async fn fetch_all(
    sources: &[Source],
    transport: &dyn FeedTransport,
    timeout: Duration,
    concurrency: usize,
) -> FetchOutcome {
    ensure_metrics_described();

    let width = concurrency.max(1);
    let mut out = FetchOutcome {
        sources_total: sources.len(),
        ..FetchOutcome::default()
    };

    for (wave_no, wave) in sources.chunks(width).enumerate() {
        let results = join_all(wave.iter().map(|s| fetch_source(s, transport, timeout))).await;

        for mut items in results {
            if items.is_empty() {
                out.sources_failed += 1;
                counter!("digest_source_errors_total").increment(1);
            } else {
                out.sources_ok += 1;
                counter!("digest_items_fetched_total").increment(items.len() as u64);
                out.items.append(&mut items);
            }
        }

        let processed = (wave_no * width + wave.len()).min(sources.len());
        tracing::info!(
            target: "digest",
            processed,
            total = sources.len(),
            ok = out.sources_ok,
            failed = out.sources_failed,
            "fetch progress"
        );
    }

    tracing::info!(
        target: "digest",
        items = out.items.len(),
        ok = out.sources_ok,
        failed = out.sources_failed,
        "fetch finished"
    );
    out
}

/// Keep items strictly newer than `now - hours`. An item exactly on the cutoff is dropped.
pub fn filter_recent(items: Vec<Item>, now: DateTime<Utc>, hours: u32) -> Vec<Item> {
    let cutoff = now - ChronoDuration::hours(i64::from(hours));
    items.into_iter().filter(|it| it.published_at > cutoff).collect()
}
