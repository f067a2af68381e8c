// src/config/sources.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::DigestConfig;
use crate::ingest::types::Source;

const DEFAULT_SOURCES_TOML: &str = include_str!("../../config/sources.toml");

#[derive(Debug, Deserialize)]
struct SourceRow {
    name: String,
    #[serde(alias = "xmlUrl", alias = "url")]
    locator: String,
    #[serde(default, alias = "htmlUrl")]
    display_locator: Option<String>,
}

impl From<SourceRow> for Source {
    fn from(r: SourceRow) -> Self {
        let display = r
            .display_locator
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| r.locator.clone());
        Source::new(r.name.trim(), r.locator.trim(), display.trim())
    }
}

/// Built-in feed list (embedded `config/sources.toml`).
pub fn default_sources() -> Vec<Source> {
    parse_toml(DEFAULT_SOURCES_TOML).unwrap_or_default()
}

/// Load a feed list from an explicit path. Supports TOML or JSON formats.
pub fn load_sources_from(path: &Path) -> Result<Vec<Source>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    parse_sources(&content, ext.as_str())
}

/// Resolve the feed list:
/// 1) `cfg.sources_path` (flag or $DIGEST_SOURCES_PATH)
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) the embedded default list
///
/// X/Twitter accounts are appended as RSSHub feeds.
pub fn load_sources(cfg: &DigestConfig) -> Result<Vec<Source>> {
    let mut sources = if let Some(p) = &cfg.sources_path {
        if !p.exists() {
            return Err(anyhow!("sources path {} does not exist", p.display()));
        }
        load_sources_from(p)?
    } else if let Some(p) = ["config/sources.toml", "config/sources.json"]
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
    {
        load_sources_from(&p)?
    } else {
        default_sources()
    };

    sources.extend(x_sources(&cfg.rsshub_base_url, &cfg.x_accounts));
    Ok(clean_sources(sources))
}

/// One RSSHub feed per X/Twitter account.
pub fn x_sources(rsshub_base: &str, accounts: &[String]) -> Vec<Source> {
    let base = rsshub_base.trim_end_matches('/');
    accounts
        .iter()
        .map(|a| {
            Source::new(
                format!("X @{a}"),
                format!("{base}/twitter/user/{a}"),
                format!("https://x.com/{a}"),
            )
        })
        .collect()
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<Source>> {
    // Try TOML first if hinted or content looks like toml.
    let try_toml = hint_ext == "toml" || s.contains("[[sources]]");
    if try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    if let Ok(v) = parse_json(s) {
        return Ok(v);
    }
    if !try_toml {
        if let Ok(v) = parse_toml(s) {
            return Ok(v);
        }
    }
    Err(anyhow!("unsupported sources format"))
}

fn parse_toml(s: &str) -> Result<Vec<Source>> {
    #[derive(Deserialize)]
    struct TomlSources {
        sources: Vec<SourceRow>,
    }
    let v: TomlSources = toml::from_str(s)?;
    Ok(clean_sources(v.sources.into_iter().map(Source::from).collect()))
}

fn parse_json(s: &str) -> Result<Vec<Source>> {
    let v: Vec<SourceRow> = serde_json::from_str(s)?;
    Ok(clean_sources(v.into_iter().map(Source::from).collect()))
}

/// Drop rows without a name or locator and duplicate locators; keeps first-seen order.
fn clean_sources(items: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|s| !s.name.is_empty() && !s.locator.is_empty())
        .filter(|s| seen.insert(s.locator.clone()))
        .collect()
}
