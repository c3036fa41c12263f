//! Full-text retrieval and the sufficiency gate.
//!
//! The scraper is a trait seam so item processors can be tested without the
//! network. The sufficiency validator asks an LLM whether scraped text is
//! substantive enough to enrich; the validator's own failure is fail-open
//! so its unavailability never loses content.

use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use thiserror::Error;

use crate::llm::{call_structured, LlmClient, LlmError, LlmRequest, LlmTask};
use crate::model::ErrorCategory;

/// Structured extraction result for one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedContent {
    pub title: String,
    pub content: String,
    /// Extractor-reported type (e.g. `article`), checked against a feed's
    /// accepted-types allow-list before sufficiency validation.
    pub content_type: Option<String>,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("scrape timed out: {0}")]
    Timeout(String),
    #[error("scrape connection failed: {0}")]
    Connection(String),
    #[error("upstream returned status {status} for {url}")]
    Upstream { status: u16, url: String },
    #[error("empty extraction for {0}")]
    EmptyExtraction(String),
}

impl ScrapeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ScrapeError::InvalidUrl(_) => ErrorCategory::Validation,
            ScrapeError::Timeout(_)
            | ScrapeError::Connection(_)
            | ScrapeError::Upstream { .. } => ErrorCategory::ApiConnection,
            ScrapeError::EmptyExtraction(_) => ErrorCategory::Validation,
        }
    }
}

#[async_trait]
pub trait Scraper: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedContent, ScrapeError>;
}

/// Plain HTTP scraper: fetch, strip markup, pick the `<title>` and an
/// `og:type` hint. Good enough for journal landing pages and press releases.
pub struct HttpScraper {
    http: reqwest::Client,
}

impl HttpScraper {
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

impl Default for HttpScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scraper for HttpScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedContent, ScrapeError> {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ScrapeError::InvalidUrl(url.to_string()));
        }

        let resp = self.http.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                ScrapeError::Timeout(e.to_string())
            } else {
                ScrapeError::Connection(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ScrapeError::Upstream {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let html = resp
            .text()
            .await
            .map_err(|e| ScrapeError::Connection(e.to_string()))?;

        let title = capture_first(&html, title_regex())
            .map(|t| crate::feeds::normalize_text(&t))
            .unwrap_or_default();
        let (og_a, og_b) = og_type_regexes();
        let content_type = capture_first(&html, og_a).or_else(|| capture_first(&html, og_b));

        let body = strip_markup(&html);
        if body.is_empty() {
            return Err(ScrapeError::EmptyExtraction(url.to_string()));
        }

        Ok(ScrapedContent {
            title,
            content: body,
            content_type,
        })
    }
}

fn capture_first(html: &str, re: &regex::Regex) -> Option<String> {
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn title_regex() -> &'static regex::Regex {
    static RE: OnceCell<regex::Regex> = OnceCell::new();
    RE.get_or_init(|| regex::Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

/// The og:type meta tag, attribute order either way.
fn og_type_regexes() -> (&'static regex::Regex, &'static regex::Regex) {
    static RE_A: OnceCell<regex::Regex> = OnceCell::new();
    static RE_B: OnceCell<regex::Regex> = OnceCell::new();
    (
        RE_A.get_or_init(|| {
            regex::Regex::new(r#"(?i)property="og:type"\s+content="([^"]+)""#).unwrap()
        }),
        RE_B.get_or_init(|| {
            regex::Regex::new(r#"(?i)content="([^"]+)"\s+property="og:type""#).unwrap()
        }),
    )
}

/// Drop scripts/styles/tags, decode entities, collapse whitespace.
fn strip_markup(html: &str) -> String {
    static RE_SCRIPT: OnceCell<regex::Regex> = OnceCell::new();
    let re_script = RE_SCRIPT
        .get_or_init(|| regex::Regex::new(r"(?is)<(script|style)[^>]*>.*?</(script|style)>").unwrap());
    let no_scripts = re_script.replace_all(html, " ");
    crate::feeds::normalize_text(&no_scripts)
}

/// Below this the text cannot carry a study summary; no LLM call needed.
const MIN_CONTENT_CHARS: usize = 300;

#[derive(Debug, Deserialize)]
struct SufficiencyVerdict {
    sufficient: bool,
}

/// Ask the LLM whether `content` is substantive enough to enrich.
///
/// Fail-open: if the validator itself fails, the content is treated as
/// sufficient and a warning is logged.
pub async fn validate_sufficiency(llm: &dyn LlmClient, model: &str, content: &str) -> bool {
    if content.chars().count() < MIN_CONTENT_CHARS {
        return false;
    }

    let system = "You review scraped medical-news text. Decide whether it contains enough \
        substantive scientific content (findings, methods, outcomes) to summarize for \
        clinicians. Respond with a JSON object: {\"sufficient\": true|false}.";
    let excerpt: String = content.chars().take(6000).collect();
    let req = LlmRequest::new(LlmTask::SufficiencyCheck, system, excerpt, model);

    match call_structured::<SufficiencyVerdict>(llm, req).await {
        Ok(v) => v.sufficient,
        Err(e) => {
            tracing::warn!(error = %e, "sufficiency validator failed; treating content as sufficient");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn scrape_errors_carry_categories() {
        assert_eq!(
            ScrapeError::InvalidUrl("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            ScrapeError::Timeout("t".into()).category(),
            ErrorCategory::ApiConnection
        );
        assert_eq!(
            ScrapeError::Upstream {
                status: 503,
                url: "u".into()
            }
            .category(),
            ErrorCategory::ApiConnection
        );
    }

    #[test]
    fn strip_markup_removes_scripts_and_tags() {
        let html = r#"<html><head><script>var x=1;</script><title>T</title></head>
            <body><p>Randomized&nbsp;trial results.</p></body></html>"#;
        let out = strip_markup(html);
        assert!(out.contains("Randomized trial results"));
        assert!(!out.contains("var x"));
    }

    #[test]
    fn title_and_og_type_are_captured() {
        let html = r#"<title>RCT of Drug X</title><meta property="og:type" content="article"/>"#;
        assert_eq!(
            capture_first(html, title_regex()).as_deref(),
            Some("RCT of Drug X")
        );
        let (og_a, og_b) = og_type_regexes();
        assert_eq!(capture_first(html, og_a).as_deref(), Some("article"));
        // Reversed attribute order is handled by the second pattern.
        let reversed = r#"<meta content="article" property="og:type"/>"#;
        assert_eq!(capture_first(reversed, og_b).as_deref(), Some("article"));
    }

    #[tokio::test]
    async fn short_content_is_insufficient_without_llm_call() {
        struct Panicking;
        #[async_trait]
        impl LlmClient for Panicking {
            async fn call_json(&self, _req: LlmRequest) -> Result<Value, LlmError> {
                panic!("validator must not be called for trivially short content");
            }
            fn name(&self) -> &'static str {
                "panicking"
            }
        }
        assert!(!validate_sufficiency(&Panicking, "m", "too short").await);
    }

    #[tokio::test]
    async fn validator_failure_is_fail_open() {
        struct Failing;
        #[async_trait]
        impl LlmClient for Failing {
            async fn call_json(&self, _req: LlmRequest) -> Result<Value, LlmError> {
                Err(LlmError::Connection("down".into()))
            }
            fn name(&self) -> &'static str {
                "failing"
            }
        }
        let long = "clinical outcomes ".repeat(40);
        assert!(validate_sufficiency(&Failing, "m", &long).await);
    }
}
