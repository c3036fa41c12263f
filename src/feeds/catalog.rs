//! Static feed catalog + pipeline settings, loaded from TOML.
//!
//! Load order: $NEWS_FEEDS_PATH, then config/feeds.toml. A missing file
//! yields an empty catalog with default settings; a malformed file is an
//! error.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dedup::DuplicatePolicy;
use crate::imagegen::RetryPolicy;

const ENV_PATH: &str = "NEWS_FEEDS_PATH";
const DEFAULT_PATH: &str = "config/feeds.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    #[default]
    Rss,
    Drug,
}

/// One configured source; consumed read-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    /// Originating group/publisher name stored on records.
    pub source: String,
    /// Contextual specialty unioned into every item's detected specialties.
    pub specialty: String,
    #[serde(default)]
    pub kind: FeedKind,
    #[serde(default)]
    pub accepted_news_types: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Bounded per-feed fan-out permits.
    #[serde(default = "default_item_concurrency")]
    pub item_concurrency: usize,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_item_concurrency() -> usize {
    4
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            item_concurrency: default_item_concurrency(),
            duplicate_policy: DuplicatePolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "feed")]
    pub feeds: Vec<FeedSource>,
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl Catalog {
    pub fn enabled_feeds(&self) -> impl Iterator<Item = &FeedSource> {
        self.feeds.iter().filter(|f| f.enabled)
    }
}

pub fn load_catalog_from(path: &Path) -> Result<Catalog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading feed catalog from {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("parsing feed catalog {}", path.display()))
}

/// Env override first, then the default path, else an empty catalog.
pub fn load_catalog_default() -> Result<Catalog> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_catalog_from(&pb);
        }
        return Err(anyhow!("NEWS_FEEDS_PATH points to non-existent path"));
    }
    let default = PathBuf::from(DEFAULT_PATH);
    if default.exists() {
        return load_catalog_from(&default);
    }
    Ok(Catalog::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const SAMPLE: &str = r#"
[pipeline]
item_concurrency = 3
duplicate_policy = "fail_closed"

[[feed]]
url = "https://j.example/rss"
source = "Journal Example"
specialty = "Cardiology"
accepted_news_types = ["article"]

[[feed]]
url = "https://drugs.example/feed"
source = "Drug Announcements"
specialty = "General Medicine"
kind = "drug"
enabled = false
"#;

    #[test]
    fn sample_catalog_parses_with_defaults() {
        let cat: Catalog = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cat.feeds.len(), 2);
        assert_eq!(cat.pipeline.item_concurrency, 3);
        assert_eq!(cat.pipeline.duplicate_policy, DuplicatePolicy::FailClosed);
        assert_eq!(cat.feeds[0].kind, FeedKind::Rss);
        assert!(cat.feeds[0].enabled);
        assert_eq!(cat.feeds[1].kind, FeedKind::Drug);
        assert_eq!(cat.enabled_feeds().count(), 1);
        // Retry policy falls back to defaults when absent.
        assert_eq!(cat.pipeline.retry.max_retries, 3);
    }

    #[serial_test::serial]
    #[test]
    fn env_path_takes_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("feeds.toml");
        fs::write(&p, SAMPLE).unwrap();

        env::set_var(ENV_PATH, p.display().to_string());
        let cat = load_catalog_default().unwrap();
        assert_eq!(cat.feeds.len(), 2);
        env::remove_var(ENV_PATH);
    }

    #[serial_test::serial]
    #[test]
    fn missing_env_path_is_an_error() {
        env::set_var(ENV_PATH, "/nonexistent/feeds.toml");
        assert!(load_catalog_default().is_err());
        env::remove_var(ENV_PATH);
    }
}
