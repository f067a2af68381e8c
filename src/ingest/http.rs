// src/ingest/http.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use metrics::counter;
use std::time::Duration;

use crate::ingest::types::FeedTransport;

const ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml, text/xml, */*";

/// reqwest-backed feed transport. Per-source timeouts are enforced by the
/// fetcher, the client only carries a connect timeout.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        crate::ingest::ensure_metrics_described();
        let client = reqwest::Client::builder()
            .user_agent(concat!("feed-digest/", env!("CARGO_PKG_VERSION"), " (RSS reader)"))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("building feed http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn get(&self, locator: &str) -> Result<String> {
        let resp = self
            .client
            .get(locator)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .send()
            .await
            .with_context(|| format!("feed http get {locator}"))?;

        let status = resp.status();
        if !status.is_success() {
            counter!("digest_source_http_status_errors_total").increment(1);
            return Err(anyhow!("HTTP {status}"));
        }
        resp.text().await.context("feed http .text()")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn returns_body_on_success_and_errors_on_non_2xx() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.xml"))
            .and(header_exists("user-agent"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<rss/>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let t = HttpTransport::new().unwrap();
        let body = t.get(&format!("{}/ok.xml", server.uri())).await.unwrap();
        assert_eq!(body, "<rss/>");

        let err = t
            .get(&format!("{}/gone.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("404"));
    }
}
