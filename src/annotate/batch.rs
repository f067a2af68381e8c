//! Batch scheduler.
//!
//! Items are cut into contiguous batches, batches run in waves of bounded
//! width, and every batch resolves to exactly one value per entry: parsed when
//! the provider cooperated, `default(entry)` otherwise. The returned map is
//! keyed by the global entry index, never by batch-local position.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

use futures::future::join_all;
use metrics::{counter, histogram};
use tracing::{info, warn};

use crate::annotate::{ensure_metrics_described, Annotator};

/// What one LLM call needs to know about an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub index: usize,
    pub title: String,
    pub body: String,
    pub source_name: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub max_concurrent: usize,
    /// Stage name for logs ("scoring", "summary").
    pub label: &'static str,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_concurrent: 2,
            label: "annotate",
        }
    }
}

/// Split `entries` into contiguous batches of at most `size` (0 is treated as 1).
pub fn partition(entries: &[BatchEntry], size: usize) -> Vec<&[BatchEntry]> {
    entries.chunks(size.max(1)).collect()
}

/// Annotate every entry. See the module docs for the containment rules.
pub async fn annotate_batches<T, B, P, D>(
    entries: &[BatchEntry],
    opts: BatchOptions,
    annotator: &dyn Annotator,
    build_prompt: B,
    parse: P,
    default: D,
) -> BTreeMap<usize, T>
where
    B: Fn(&[BatchEntry]) -> String,
    P: Fn(&str) -> anyhow::Result<Vec<(usize, T)>>,
    D: Fn(&BatchEntry) -> T,
{
    ensure_metrics_described();

    let batches = partition(entries, opts.batch_size);
    let width = opts.max_concurrent.max(1);
    info!(
        target: "digest",
        stage = opts.label,
        items = entries.len(),
        batches = batches.len(),
        "annotating"
    );

    let mut merged = BTreeMap::new();
    let mut done = 0usize;
    for wave in batches.chunks(width) {
        let results = join_all(
            wave.iter()
                .map(|batch| run_batch(batch, opts.label, annotator, &build_prompt, &parse, &default)),
        )
        .await;
        for pairs in results {
            merged.extend(pairs);
        }
        done += wave.len();
        info!(
            target: "digest",
            stage = opts.label,
            done,
            total = batches.len(),
            "batch progress"
        );
    }
    merged
}

async fn run_batch<T, B, P, D>(
    batch: &[BatchEntry],
    label: &'static str,
    annotator: &dyn Annotator,
    build_prompt: &B,
    parse: &P,
    default: &D,
) -> Vec<(usize, T)>
where
    B: Fn(&[BatchEntry]) -> String,
    P: Fn(&str) -> anyhow::Result<Vec<(usize, T)>>,
    D: Fn(&BatchEntry) -> T,
{
    let t0 = Instant::now();
    let prompt = build_prompt(batch);
    let parsed = match annotator.call(&prompt).await {
        Ok(text) => parse(&text),
        Err(e) => Err(anyhow::Error::new(e)),
    };
    histogram!("digest_batch_ms", "stage" => label).record(t0.elapsed().as_secs_f64() * 1_000.0);

    let results = match parsed {
        Ok(results) => results,
        Err(e) => {
            warn!(
                target: "digest",
                stage = label,
                first_index = batch.first().map(|b| b.index),
                size = batch.len(),
                error = %e,
                "batch failed, using defaults"
            );
            counter!("digest_batch_defaulted_total", "stage" => label).increment(1);
            return batch.iter().map(|e| (e.index, default(e))).collect();
        }
    };

    let wanted: HashSet<usize> = batch.iter().map(|e| e.index).collect();
    let mut by_index: HashMap<usize, T> = HashMap::with_capacity(batch.len());
    let mut extras = 0usize;
    for (idx, value) in results {
        if wanted.contains(&idx) {
            by_index.entry(idx).or_insert(value);
        } else {
            extras += 1;
        }
    }

    let mut missing = 0usize;
    let out = batch
        .iter()
        .map(|e| {
            let v = by_index.remove(&e.index).unwrap_or_else(|| {
                missing += 1;
                default(e)
            });
            (e.index, v)
        })
        .collect();

    if extras > 0 || missing > 0 {
        warn!(
            target: "digest",
            stage = label,
            extras,
            missing,
            "response did not match the batch exactly"
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<BatchEntry> {
        (0..n)
            .map(|i| BatchEntry {
                index: i,
                title: format!("title {i}"),
                body: String::new(),
                source_name: "src".into(),
                link: String::new(),
            })
            .collect()
    }

    #[test]
    fn partition_is_contiguous_and_covers_everything() {
        let e = entries(23);
        let parts = partition(&e, 10);
        assert_eq!(parts.iter().map(|p| p.len()).collect::<Vec<_>>(), vec![10, 10, 3]);
        assert_eq!(parts[1][0].index, 10);
        assert_eq!(partition(&e, 0).len(), 23);
        assert!(partition(&[], 10).is_empty());
    }
}
