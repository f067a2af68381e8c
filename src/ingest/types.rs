// src/ingest/types.rs
use anyhow::Result;
use chrono::{DateTime, Utc};

/// One configured feed. Immutable for the whole run.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Source {
    pub name: String,            // e.g., "simonwillison.net"
    pub locator: String,         // feed URL
    pub display_locator: String, // human-facing homepage
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        locator: impl Into<String>,
        display_locator: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            display_locator: display_locator.into(),
        }
    }
}

/// A feed entry after fetching and normalization.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Item {
    pub title: String,
    pub link: String,
    pub published_at: DateTime<Utc>, // epoch when the feed date is unparseable
    pub body: String,
    pub source_name: String,
    pub source_display: String,
}

/// Raw bytes-to-text retrieval of one feed. The HTTP implementation lives in
/// `ingest::http`; tests plug in their own.
#[async_trait::async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get(&self, locator: &str) -> Result<String>;
}
