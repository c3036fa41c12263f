//! Tolerant RSS 2.0 / Atom parsing into `RawFeedItem`s.
//!
//! Feed XML in the wild carries bare HTML entities that break strict XML
//! parsing, so the document is scrubbed first. Dates are accepted in both
//! RFC 2822 (RSS) and RFC 3339 (Atom) forms. A DOI is picked up from the
//! guid or link when one is embedded.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use quick_xml::de::from_str;
use serde::Deserialize;
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use crate::feeds::normalize_text;
use crate::model::RawFeedItem;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    guid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<String>,
    // Entries routinely carry several <link> elements (alternate, self,
    // related); collect them all.
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
    updated: Option<String>,
    published: Option<String>,
    summary: Option<String>,
    id: Option<String>,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

/// Pick the article link: `rel="alternate"` wins, then a link with no rel
/// (which means alternate in Atom), then whatever comes first.
fn pick_atom_link(links: &[AtomLink]) -> Option<&str> {
    links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| links.iter().find(|l| l.rel.is_none()))
        .or_else(|| links.first())
        .and_then(|l| l.href.as_deref())
}

/// Parse a feed document, RSS 2.0 first, Atom as fallback.
pub fn parse_feed(xml: &str) -> Result<Vec<RawFeedItem>> {
    let clean = scrub_html_entities_for_xml(xml);

    if let Ok(rss) = from_str::<Rss>(&clean) {
        return Ok(rss.channel.items.into_iter().map(rss_item_to_raw).collect());
    }

    let atom: AtomFeed = from_str(&clean).context("parsing feed as RSS and Atom both failed")?;
    Ok(atom.entries.into_iter().map(atom_entry_to_raw).collect())
}

fn rss_item_to_raw(it: Item) -> RawFeedItem {
    let link = it.link.as_deref().map(str::trim).map(str::to_string);
    let doi = it
        .guid
        .as_deref()
        .and_then(extract_doi)
        .or_else(|| link.as_deref().and_then(extract_doi));
    RawFeedItem {
        title: it.title.as_deref().map(normalize_text).filter(|t| !t.is_empty()),
        link: link.filter(|l| !l.is_empty()),
        published_at: it.pub_date.as_deref().and_then(parse_feed_date),
        description: it
            .description
            .as_deref()
            .map(normalize_text)
            .filter(|d| !d.is_empty()),
        doi,
    }
}

fn atom_entry_to_raw(e: AtomEntry) -> RawFeedItem {
    let link = pick_atom_link(&e.links).map(|h| h.trim().to_string());
    let doi = e
        .id
        .as_deref()
        .and_then(extract_doi)
        .or_else(|| link.as_deref().and_then(extract_doi));
    RawFeedItem {
        title: e.title.as_deref().map(normalize_text).filter(|t| !t.is_empty()),
        link: link.filter(|l| !l.is_empty()),
        published_at: e
            .published
            .as_deref()
            .or(e.updated.as_deref())
            .and_then(parse_feed_date),
        description: e
            .summary
            .as_deref()
            .map(normalize_text)
            .filter(|d| !d.is_empty()),
        doi,
    }
}

/// Accept RFC 2822 ("Sun, 01 Jun 2025 08:00:00 GMT") and RFC 3339.
pub fn parse_feed_date(ts: &str) -> Option<DateTime<Utc>> {
    let odt = OffsetDateTime::parse(ts, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(ts, &Rfc3339))
        .ok()?;
    DateTime::<Utc>::from_timestamp(odt.unix_timestamp(), 0)
}

/// Pull a DOI (`10.xxxx/suffix`) out of a guid or URL if one is embedded.
pub fn extract_doi(s: &str) -> Option<String> {
    static RE_DOI: OnceCell<regex::Regex> = OnceCell::new();
    let re = RE_DOI.get_or_init(|| regex::Regex::new(r"\b(10\.\d{4,9}/[^\s\?&#]+)").unwrap());
    re.captures(s)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',', ';']).to_string())
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}
