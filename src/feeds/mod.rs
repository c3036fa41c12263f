//! Feed intake: catalog configuration, feed fetching, RSS/Atom parsing,
//! and the shared text-normalization helper.

pub mod catalog;
pub mod rss;

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use once_cell::sync::OnceCell;

use crate::model::RawFeedItem;

/// Fetch seam so orchestration tests can feed fixture XML without HTTP.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}

pub struct HttpFeedFetcher {
    http: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .user_agent("mednews-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http }
    }
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("fetching feed {url}"))?;
        resp.error_for_status_ref()
            .with_context(|| format!("feed {url} returned error status"))?;
        resp.text().await.context("reading feed body")
    }
}

/// Fetch a feed document and parse it into normalized raw items.
pub async fn read_feed(fetcher: &dyn FeedFetcher, url: &str) -> Result<Vec<RawFeedItem>> {
    let body = fetcher.fetch(url).await?;
    rss::parse_feed(&body)
}

/// Normalize text: decode entities, strip tags, collapse whitespace,
/// normalize curly quotes, cap length.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize curly quotes to ASCII
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").to_string();
    out = out.trim().to_string();

    // 5) Length cap: 20k chars is plenty for any prompt we build
    if out.chars().count() > 20_000 {
        out = out.chars().take(20_000).collect();
    }

    out
}
