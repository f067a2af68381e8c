//! # Digest pipeline
//! Fetch → Filter → Score → Summarize → Highlight. Every stage is a full
//! barrier: it consumes all of its input before the next one starts.
//!
//! Item identity for annotation is the dense position in the working set. The
//! filtered set is indexed once for scoring; the top-N are re-indexed from 0
//! before summarization.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::annotate::highlights::generate_highlights;
use crate::annotate::scoring::{build_scoring_prompt, default_score, parse_scoring_response};
use crate::annotate::summary::{build_summary_prompt, default_summary, parse_summary_response};
use crate::annotate::{
    annotate_batches, AnnotateError, AnnotationClient, Annotator, BatchEntry, BatchOptions, Lang,
    ScoreResult, SummaryResult,
};
use crate::config::DigestConfig;
use crate::ingest::types::{FeedTransport, Item, Source};
use crate::ingest::{fetch_all, filter_recent};

/// Terminal entity handed to the report renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnnotatedItem {
    pub item: Item,
    pub score: ScoreResult,
    pub summary: SummaryResult,
}

impl AnnotatedItem {
    pub fn total(&self) -> u32 {
        self.score.total()
    }

    /// Translated title when we have one, original otherwise.
    pub fn display_title(&self) -> &str {
        if self.summary.translated_title.is_empty() {
            &self.item.title
        } else {
            &self.summary.translated_title
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub sources_total: usize,
    pub sources_ok: usize,
    pub items_total: usize,
    pub items_filtered: usize,
    pub hours_window: u32,
}

#[derive(Debug, Clone)]
pub struct DigestOutcome {
    pub items: Vec<AnnotatedItem>,
    pub highlights: String,
    pub stats: RunStats,
}

/// Conditions that end the run without a report.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    #[error("missing API key: set GEMINI_API_KEY and/or OPENAI_API_KEY")]
    NoProvider,
    #[error("could not set up the LLM client: {0}")]
    ClientSetup(AnnotateError),
    #[error("no items fetched from any of {sources} sources; check the network connection")]
    NoItemsFetched { sources: usize },
    #[error("no items published within the last {hours} hours; try a larger --hours (e.g. 168)")]
    NoRecentItems { hours: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub hours: u32,
    pub top_n: usize,
    pub lang: Lang,
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub feed_concurrency: usize,
    pub feed_timeout: Duration,
}

impl From<&DigestConfig> for PipelineOptions {
    fn from(cfg: &DigestConfig) -> Self {
        Self {
            hours: cfg.hours,
            top_n: cfg.top_n,
            lang: cfg.lang,
            batch_size: cfg.batch_size,
            max_concurrent_batches: cfg.max_concurrent_batches,
            feed_concurrency: cfg.feed_concurrency,
            feed_timeout: cfg.feed_timeout,
        }
    }
}

/// Build the annotation client, mapping "nothing configured" to the fatal run error.
pub fn build_client(cfg: &DigestConfig) -> Result<AnnotationClient, DigestError> {
    if !cfg.has_provider() {
        return Err(DigestError::NoProvider);
    }
    AnnotationClient::from_config(cfg).map_err(|e| match e {
        AnnotateError::NotConfigured => DigestError::NoProvider,
        other => DigestError::ClientSetup(other),
    })
}

/// Dense 0-based batch entries in the order given.
pub fn to_entries<'a>(items: impl IntoIterator<Item = &'a Item>) -> Vec<BatchEntry> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, it)| BatchEntry {
            index,
            title: it.title.clone(),
            body: it.body.clone(),
            source_name: it.source_name.clone(),
            link: it.link.clone(),
        })
        .collect()
}

/// Stable sort by total score, descending; ties keep fetch order. Then keep `top_n`.
pub fn rank_top(mut scored: Vec<(Item, ScoreResult)>, top_n: usize) -> Vec<(Item, ScoreResult)> {
    scored.sort_by(|a, b| b.1.total().cmp(&a.1.total()));
    scored.truncate(top_n);
    scored
}

pub async fn run(
    sources: &[Source],
    transport: &dyn FeedTransport,
    annotator: &dyn Annotator,
    opts: PipelineOptions,
    now: DateTime<Utc>,
) -> Result<DigestOutcome, DigestError> {
    // 1) Fetch
    info!(target: "digest", sources = sources.len(), "step 1/5: fetching feeds");
    let fetched = fetch_all(sources, transport, opts.feed_timeout, opts.feed_concurrency).await;
    let items_total = fetched.items.len();
    if items_total == 0 {
        return Err(DigestError::NoItemsFetched {
            sources: sources.len(),
        });
    }

    // 2) Recency filter
    info!(target: "digest", hours = opts.hours, "step 2/5: filtering by time window");
    let recent = filter_recent(fetched.items, now, opts.hours);
    info!(target: "digest", kept = recent.len(), of = items_total, "recent items");
    if recent.is_empty() {
        return Err(DigestError::NoRecentItems { hours: opts.hours });
    }
    let items_filtered = recent.len();

    // 3) Score
    info!(target: "digest", items = items_filtered, "step 3/5: scoring");
    let entries = to_entries(&recent);
    let mut scores = annotate_batches(
        &entries,
        BatchOptions {
            batch_size: opts.batch_size,
            max_concurrent: opts.max_concurrent_batches,
            label: "scoring",
        },
        annotator,
        build_scoring_prompt,
        parse_scoring_response,
        default_score,
    )
    .await;

    // 4) Rank
    let scored: Vec<(Item, ScoreResult)> = recent
        .into_iter()
        .enumerate()
        .map(|(i, it)| (it, scores.remove(&i).unwrap_or_default()))
        .collect();
    let top = rank_top(scored, opts.top_n);
    info!(
        target: "digest",
        selected = top.len(),
        best = top.first().map(|t| t.1.total()),
        worst = top.last().map(|t| t.1.total()),
        "top items selected"
    );

    // 5) Re-index densely + summarize
    info!(target: "digest", items = top.len(), "step 4/5: summarizing");
    let top_entries = to_entries(top.iter().map(|(it, _)| it));
    let lang = opts.lang;
    let mut summaries = annotate_batches(
        &top_entries,
        BatchOptions {
            batch_size: opts.batch_size,
            max_concurrent: opts.max_concurrent_batches,
            label: "summary",
        },
        annotator,
        |batch: &[BatchEntry]| build_summary_prompt(batch, lang),
        parse_summary_response,
        default_summary,
    )
    .await;

    let items: Vec<AnnotatedItem> = top
        .into_iter()
        .zip(top_entries.iter())
        .map(|((item, score), entry)| {
            let mut summary = summaries
                .remove(&entry.index)
                .unwrap_or_else(|| default_summary(entry));
            if summary.translated_title.is_empty() {
                summary.translated_title = item.title.clone();
            }
            AnnotatedItem {
                item,
                score,
                summary,
            }
        })
        .collect();

    // 6) Highlights
    info!(target: "digest", "step 5/5: generating highlights");
    let highlights = generate_highlights(&items, annotator, lang).await;

    Ok(DigestOutcome {
        items,
        highlights,
        stats: RunStats {
            sources_total: fetched.sources_total,
            sources_ok: fetched.sources_ok,
            items_total,
            items_filtered,
            hours_window: opts.hours,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> Item {
        Item {
            title: title.into(),
            link: String::new(),
            published_at: DateTime::<Utc>::UNIX_EPOCH,
            body: String::new(),
            source_name: "s".into(),
            source_display: String::new(),
        }
    }

    fn score(v: u8) -> ScoreResult {
        ScoreResult {
            practicality: v,
            deployability: v,
            technical_value: v,
            timeliness: v,
            non_tech_redundancy: v,
            ..ScoreResult::default()
        }
    }

    #[test]
    fn ranking_is_descending_and_stable_on_ties() {
        let scored = vec![
            (item("a"), score(3)),
            (item("b"), score(5)),
            (item("c"), score(3)),
            (item("d"), score(4)),
            (item("e"), score(3)),
        ];
        let top = rank_top(scored, 4);
        let titles: Vec<&str> = top.iter().map(|(i, _)| i.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn entries_are_dense_from_zero() {
        let items = vec![item("x"), item("y")];
        let e = to_entries(items.iter().rev());
        assert_eq!(e[0].index, 0);
        assert_eq!(e[0].title, "y");
        assert_eq!(e[1].index, 1);
    }

    #[test]
    fn display_title_falls_back_to_original() {
        let a = AnnotatedItem {
            item: item("Original"),
            score: ScoreResult::default(),
            summary: SummaryResult::default(),
        };
        assert_eq!(a.display_title(), "Original");
    }
}
