//! RSS 2.0 / Atom parsing.
//!
//! `parse_feed` never fails: unrecognized or broken input yields an empty list,
//! so a bad feed only ever costs its own items.

use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::{OffsetDateTime, UtcOffset};

use crate::ingest::normalize_text;

/// Cap for entry descriptions, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

/// One entry as it appears in the feed, before it is attached to a source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub published: String,
    pub description: String,
}

/// Element whose attributes we don't care about (`<title type="html">`, `<guid isPermaLink>`).
#[derive(Debug, Default, Deserialize)]
struct Text {
    #[serde(rename = "$text", default)]
    value: String,
}

impl Text {
    fn into_opt(t: Option<Text>) -> Option<String> {
        t.map(|t| t.value).filter(|v| !v.trim().is_empty())
    }
}

// ---- RSS 2.0 ----

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<Text>,
    link: Option<Text>,
    guid: Option<Text>,
    #[serde(rename = "pubDate")]
    pub_date: Option<Text>,
    #[serde(rename = "dc:date")]
    dc_date: Option<Text>,
    description: Option<Text>,
    #[serde(rename = "content:encoded")]
    content_encoded: Option<Text>,
}

// ---- Atom ----

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<Text>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    published: Option<Text>,
    updated: Option<Text>,
    summary: Option<Text>,
    content: Option<Text>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href", default)]
    href: String,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

fn looks_like_atom(s: &str) -> bool {
    s.contains("<feed ") || s.contains("<feed>")
}

/// Parse raw feed text. Tries the detected dialect first, then the other one.
pub fn parse_feed(raw: &str) -> Vec<RawEntry> {
    let xml = scrub_html_entities_for_xml(raw);
    let atom_first = looks_like_atom(&xml);

    let (first, second): (fn(&str) -> Option<Vec<RawEntry>>, fn(&str) -> Option<Vec<RawEntry>>) =
        if atom_first {
            (parse_atom, parse_rss)
        } else {
            (parse_rss, parse_atom)
        };

    match first(&xml) {
        Some(v) if !v.is_empty() => v,
        _ => second(&xml).unwrap_or_default(),
    }
}

fn parse_rss(xml: &str) -> Option<Vec<RawEntry>> {
    let rss: Rss = match from_str(xml) {
        Ok(r) => r,
        Err(e) => {
            tracing::debug!(target: "digest", error = %e, "not an rss document");
            return None;
        }
    };

    let out = rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            let title = normalize_text(&Text::into_opt(it.title).unwrap_or_default(), usize::MAX);
            let link = Text::into_opt(it.link)
                .or_else(|| Text::into_opt(it.guid))
                .map(|l| l.trim().to_string())
                .unwrap_or_default();
            let published = Text::into_opt(it.pub_date)
                .or_else(|| Text::into_opt(it.dc_date))
                .unwrap_or_default();
            let description = Text::into_opt(it.description)
                .or_else(|| Text::into_opt(it.content_encoded))
                .map(|d| normalize_text(&d, MAX_DESCRIPTION_CHARS))
                .unwrap_or_default();
            entry_if_usable(title, link, published, description)
        })
        .collect();
    Some(out)
}

fn parse_atom(xml: &str) -> Option<Vec<RawEntry>> {
    let feed: AtomFeed = match from_str(xml) {
        Ok(f) => f,
        Err(e) => {
            tracing::debug!(target: "digest", error = %e, "not an atom document");
            return None;
        }
    };

    let out = feed
        .entry
        .into_iter()
        .filter_map(|e| {
            let title = normalize_text(&Text::into_opt(e.title).unwrap_or_default(), usize::MAX);
            let link = e
                .links
                .iter()
                .find(|l| l.rel.as_deref() == Some("alternate"))
                .or_else(|| e.links.first())
                .map(|l| l.href.trim().to_string())
                .unwrap_or_default();
            let published = Text::into_opt(e.published)
                .or_else(|| Text::into_opt(e.updated))
                .unwrap_or_default();
            let description = Text::into_opt(e.summary)
                .or_else(|| Text::into_opt(e.content))
                .map(|d| normalize_text(&d, MAX_DESCRIPTION_CHARS))
                .unwrap_or_default();
            entry_if_usable(title, link, published, description)
        })
        .collect();
    Some(out)
}

fn entry_if_usable(
    title: String,
    link: String,
    published: String,
    description: String,
) -> Option<RawEntry> {
    if title.is_empty() && link.is_empty() {
        return None;
    }
    Some(RawEntry {
        title,
        link,
        published: published.trim().to_string(),
        description,
    })
}

/// Parse an RFC 2822 (RSS) or RFC 3339 (Atom) date. Unparseable → Unix epoch.
pub fn parse_published(ts: &str) -> DateTime<Utc> {
    let ts = ts.trim();
    OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .or_else(|| {
            // chrono is more lenient with obsolete zone names (EST, PDT, ...)
            DateTime::parse_from_rfc2822(ts)
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// HTML entities that are not defined in XML and make the parser bail.
fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&hellip;", "...")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
