// tests/metrics_digest.rs
#![cfg(feature = "strict-metrics")]
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use feed_digest::annotate::scoring::{build_scoring_prompt, default_score, parse_scoring_response};
use feed_digest::annotate::{annotate_batches, AnnotateError, Annotator, BatchEntry, BatchOptions};
use feed_digest::ingest::fetch_all;
use feed_digest::ingest::http::HttpTransport;
use feed_digest::{FeedTransport, Source};
use metrics_exporter_prometheus::PrometheusBuilder;
use wiremock::{Mock, MockServer, ResponseTemplate};

struct OneFeed;

#[async_trait]
impl FeedTransport for OneFeed {
    async fn get(&self, locator: &str) -> Result<String> {
        if locator.contains("down") {
            anyhow::bail!("HTTP 500");
        }
        Ok(r#"<rss version="2.0"><channel><title>t</title><item><title>x</title>
<link>https://x.test/1</link><pubDate>Sat, 01 Mar 2025 10:00:00 +0000</pubDate></item></channel></rss>"#
            .to_string())
    }
}

struct Broken;

#[async_trait]
impl Annotator for Broken {
    async fn call(&self, _prompt: &str) -> Result<String, AnnotateError> {
        Err(AnnotateError::Status {
            provider: "fake",
            status: 503,
            body: "unavailable".into(),
        })
    }
}

#[tokio::test]
async fn metrics_exposed_after_fetch_and_annotation() {
    let handle = PrometheusBuilder::new().install_recorder().expect("recorder");

    let sources = vec![
        Source::new("ok", "https://ok.test/feed", "https://ok.test"),
        Source::new("down", "https://down.test/feed", "https://down.test"),
    ];
    let out = fetch_all(&sources, &OneFeed, Duration::from_secs(1), 10).await;
    assert_eq!(out.sources_ok, 1);

    let gone = MockServer::start().await;
    Mock::given(wiremock::matchers::method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&gone)
        .await;
    let http = vec![Source::new("gone", format!("{}/feed", gone.uri()), gone.uri())];
    let out = fetch_all(&http, &HttpTransport::new().unwrap(), Duration::from_secs(2), 1).await;
    assert_eq!(out.sources_ok, 0);

    let entries = vec![BatchEntry {
        index: 0,
        title: "x".into(),
        body: String::new(),
        source_name: "ok".into(),
        link: "https://x.test/1".into(),
    }];
    let scores = annotate_batches(
        &entries,
        BatchOptions::default(),
        &Broken,
        build_scoring_prompt,
        parse_scoring_response,
        default_score,
    )
    .await;
    assert_eq!(scores.len(), 1);

    let text = handle.render();
    assert!(text.contains("digest_items_fetched_total"));
    assert!(text.contains("digest_source_errors_total"));
    assert!(text.contains("digest_fetch_ms"));
    assert!(text.contains(
        "# HELP digest_source_http_status_errors_total Feed responses with a non-2xx status."
    ));
    assert!(text.contains("digest_batch_defaulted_total"));
    assert!(text.contains("digest_batch_ms"));
}
