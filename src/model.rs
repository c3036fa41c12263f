//! Core value types shared across the pipeline: raw feed items, the
//! persisted record shape, per-item outcomes, and error categories.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One normalized entry from a syndication feed. Ephemeral: produced by the
/// feed reader, consumed by an item processor, never persisted as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub doi: Option<String>,
}

/// Synthesized answer for a news item: headline, key takeaways, body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsElements {
    pub title: String,
    #[serde(default)]
    pub bullet_points: Vec<String>,
    #[serde(default)]
    pub paragraphs: Vec<String>,
}

/// Linked external article metadata attached to a stored record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleReference {
    pub title: String,
    pub url: String,
}

/// The persisted entity. Created once by an item processor; afterwards only
/// mutated narrowly (suggested questions, image backfill), never deleted by
/// this subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedNewsRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub unique_id: String,
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    pub url: String,
    /// Calendar date, `YYYY-MM-DD`.
    pub news_date: String,
    pub news_date_timestamp: DateTime<Utc>,
    pub elements: NewsElements,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub news_type: Option<String>,
    pub specialties: Vec<String>,
    pub tags: Vec<String>,
    /// Specialty label -> summed sub-score (3..=9).
    pub scores: BTreeMap<String, u32>,
    /// Always the maximum of `scores` values.
    pub score: u32,
    #[serde(rename = "imageUrl", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_image_description: Option<String>,
    /// Exactly three reader follow-up questions.
    pub suggested_questions: Vec<String>,
    pub source: String,
    pub selecting_model: String,
    pub is_visible_in_prod: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<ArticleReference>>,
}

/// Named, expected non-error outcomes that terminate item processing early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingUrlOrTitleOrDate,
    DateTooOld,
    DateTooNew,
    NotScientificPaper,
    AlreadyInSupabase,
    NotAcceptedNewsType,
    NotEnoughContent,
    NoUrlFound,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::MissingUrlOrTitleOrDate => "missing_url_or_title_or_date",
            SkipReason::DateTooOld => "date_too_old",
            SkipReason::DateTooNew => "date_too_new",
            SkipReason::NotScientificPaper => "not_scientific_paper",
            SkipReason::AlreadyInSupabase => "already_in_supabase",
            SkipReason::NotAcceptedNewsType => "not_accepted_news_type",
            SkipReason::NotEnoughContent => "not_enough_content",
            SkipReason::NoUrlFound => "no_url_found",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of unexpected failures, used for retry/alerting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    ApiConnection,
    RateLimit,
    Validation,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::ApiConnection => "api_connection",
            ErrorCategory::RateLimit => "rate_limit",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Fallback classifier for opaque errors (feed fetch, XML decode) that
    /// reach the pipeline as `anyhow::Error`. Collaborator errors carry their
    /// own tagged category and never go through here.
    pub fn from_message(msg: &str) -> Self {
        let m = msg.to_ascii_lowercase();
        const CONNECTION: &[&str] = &[
            "connection", "timeout", "timed out", "dns", "unreachable", "reset by peer",
            "broken pipe", "refused",
        ];
        const RATE_LIMIT: &[&str] = &["rate limit", "rate_limit", "429", "too many requests", "quota"];
        const VALIDATION: &[&str] = &["invalid", "missing field", "parse", "schema", "malformed"];

        if RATE_LIMIT.iter().any(|p| m.contains(p)) {
            ErrorCategory::RateLimit
        } else if CONNECTION.iter().any(|p| m.contains(p)) {
            ErrorCategory::ApiConnection
        } else if VALIDATION.iter().any(|p| m.contains(p)) {
            ErrorCategory::Validation
        } else {
            ErrorCategory::Unknown
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of processing one item. Folded into statistics by the
/// orchestrator; never persisted as its own record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProcessingOutcome {
    Success,
    Skipped { reason: SkipReason },
    Error { message: String, category: ErrorCategory },
}

impl ProcessingOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        ProcessingOutcome::Skipped { reason }
    }

    pub fn error(message: impl Into<String>, category: ErrorCategory) -> Self {
        ProcessingOutcome::Error {
            message: message.into(),
            category,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success)
    }
}
