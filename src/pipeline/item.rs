//! Per-item state machine for the RSS path.
//!
//! Received -> Validated -> DateChecked -> ScientificGateChecked ->
//! DuplicateChecked -> Scraped -> SufficiencyChecked -> Enriched -> Stored,
//! with early exits to `Skipped(reason)` and every unexpected failure
//! converted to `Error(category)` at this boundary. Failures never
//! propagate to the orchestrator as errors.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::classify::{classify_news_type, scientific_paper_gate};
use crate::dedup::{merge_checks, DuplicateChecker};
use crate::enrich::tags::InterestVocabulary;
use crate::enrich::{EnrichError, Enricher};
use crate::feeds::catalog::PipelineSettings;
use crate::llm::{LlmClient, LlmError};
use crate::model::{
    EnrichedNewsRecord, ErrorCategory, ProcessingOutcome, RawFeedItem, SkipReason,
};
use crate::scrape::{validate_sufficiency, ScrapeError, Scraper};
use crate::storage::{InsertOutcome, NewsStore, StoreError};
use crate::unique_id::{self, IdInput};

/// Parameters fixed for one batch run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub specialty: String,
    pub start_date: DateTime<Utc>,
    /// Upper bound used by backfill windows (drug path).
    pub end_date: Option<DateTime<Utc>>,
    pub model: String,
    pub upload_id: String,
}

/// Per-feed context handed to each item task.
#[derive(Debug, Clone)]
pub struct FeedContext {
    pub source: String,
    pub specialty: String,
    pub accepted_news_types: Vec<String>,
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Enrich(#[from] EnrichError),
    #[error("{0}")]
    Other(String),
}

impl ItemError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ItemError::Llm(e) => e.category(),
            ItemError::Scrape(e) => e.category(),
            ItemError::Store(e) => e.category(),
            ItemError::Enrich(e) => e.category(),
            // Opaque errors fall back to the substring classifier.
            ItemError::Other(msg) => ErrorCategory::from_message(msg),
        }
    }
}

/// Short-circuit type used inside the state machine: a skip is not an error.
enum Step<T> {
    Go(T),
    Skip(SkipReason),
}

/// Orchestrates one raw item through validation, dedup, scrape, enrichment,
/// and storage. Cheap to clone; all collaborators are behind `Arc`.
#[derive(Clone)]
pub struct ItemProcessor {
    pub llm: Arc<dyn LlmClient>,
    pub scraper: Arc<dyn Scraper>,
    pub store: Arc<dyn NewsStore>,
    pub enricher: Enricher,
    pub settings: PipelineSettings,
    pub vocab: Arc<InterestVocabulary>,
}

impl ItemProcessor {
    pub async fn process_item(
        &self,
        item: RawFeedItem,
        params: &RunParams,
        feed: &FeedContext,
    ) -> ProcessingOutcome {
        match self.try_process(item, params, feed).await {
            Ok(Step::Go(())) => ProcessingOutcome::Success,
            Ok(Step::Skip(reason)) => {
                tracing::info!(reason = %reason, "item skipped");
                ProcessingOutcome::skipped(reason)
            }
            Err(e) => {
                let category = e.category();
                tracing::warn!(error = %e, category = %category, "item failed");
                ProcessingOutcome::error(e.to_string(), category)
            }
        }
    }

    async fn try_process(
        &self,
        item: RawFeedItem,
        params: &RunParams,
        feed: &FeedContext,
    ) -> Result<Step<()>, ItemError> {
        // Received -> Validated
        let (Some(title), Some(link), Some(published_at)) =
            (item.title.as_deref(), item.link.as_deref(), item.published_at)
        else {
            return Ok(Step::Skip(SkipReason::MissingUrlOrTitleOrDate));
        };
        let description = item.description.as_deref().unwrap_or_default();

        // Validated -> DateChecked (strict <: an item exactly at the start
        // date is kept)
        if published_at < params.start_date {
            return Ok(Step::Skip(SkipReason::DateTooOld));
        }

        // DateChecked -> ScientificGateChecked
        let gate =
            scientific_paper_gate(self.llm.as_ref(), &params.model, title, description, link)
                .await?;
        if !gate.is_scientific_paper {
            tracing::info!(reasoning = %gate.reasoning, "gate rejected item");
            return Ok(Step::Skip(SkipReason::NotScientificPaper));
        }

        // Click-tracking marker must not leak into ids, dedup keys, or scrapes.
        let url = strip_rss_param(link);
        if url.contains("rss=") {
            tracing::warn!(url = %url, "rss marker survived query stripping");
        }
        let news_date = published_at.format("%Y-%m-%d").to_string();

        // -> DuplicateChecked: legacy URL+date always; DOI additionally when
        // present. Either hit suffices.
        let checker = DuplicateChecker::new(self.store.as_ref());
        let mut checks = vec![checker.by_url_and_date(&url, &news_date).await];
        let url_uid = unique_id::generate(IdInput::UrlDate {
            url: &url,
            news_date: &news_date,
        })
        .map_err(|e| ItemError::Other(e.to_string()))?;
        checks.push(checker.by_unique_id(&url_uid).await);
        if let Some(doi) = item.doi.as_deref() {
            if let Ok(doi_uid) = unique_id::generate(IdInput::Doi(doi)) {
                checks.push(checker.by_unique_id(&doi_uid).await);
            }
        }
        if self
            .settings
            .duplicate_policy
            .is_duplicate(merge_checks(&checks))
        {
            return Ok(Step::Skip(SkipReason::AlreadyInSupabase));
        }

        // -> Scraped
        let scraped = self.scraper.scrape(&url).await?;
        if let Some(content_type) = scraped.content_type.as_deref() {
            if !feed.accepted_news_types.is_empty()
                && !feed
                    .accepted_news_types
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(content_type))
            {
                return Ok(Step::Skip(SkipReason::NotAcceptedNewsType));
            }
        }

        // -> SufficiencyChecked (fail-open on validator failure)
        if !validate_sufficiency(self.llm.as_ref(), &params.model, &scraped.content).await {
            return Ok(Step::Skip(SkipReason::NotEnoughContent));
        }

        // -> Enriched
        let enrichment = self
            .enricher
            .enrich(&params.model, title, &scraped.content, &feed.specialty, &self.vocab)
            .await?;

        // -> Stored. DOI id preferred when available; the unique_id
        // constraint makes a concurrent duplicate insert a skip, not an error.
        let uid = match item.doi.as_deref() {
            Some(doi) => unique_id::generate(IdInput::Doi(doi))
                .unwrap_or(url_uid),
            None => url_uid,
        };
        let news_type = classify_news_type(&format!("{title} {}", scraped.content))
            .map(|t| t.as_str().to_string());

        let record = EnrichedNewsRecord {
            id: None,
            unique_id: uid,
            upload_id: params.upload_id.clone(),
            doi: item.doi.clone(),
            url,
            news_date,
            news_date_timestamp: published_at,
            elements: enrichment.elements,
            news_type,
            specialties: enrichment.specialties,
            tags: enrichment.tags,
            scores: enrichment.scores,
            score: enrichment.score,
            image_url: enrichment.image_url,
            extracted_image_url: None,
            extracted_image_description: None,
            suggested_questions: enrichment.suggested_questions,
            source: feed.source.clone(),
            selecting_model: params.model.clone(),
            is_visible_in_prod: false,
            references: None,
        };

        match self.store.insert(&record).await? {
            InsertOutcome::Inserted => Ok(Step::Go(())),
            InsertOutcome::DuplicateKey => Ok(Step::Skip(SkipReason::AlreadyInSupabase)),
        }
    }
}

/// Strip the `rss` click-tracking query parameter before any downstream use.
pub fn strip_rss_param(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or("");
            key != "rss"
        })
        .collect();
    if kept.is_empty() {
        base.to_string()
    } else {
        format!("{base}?{}", kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rss_param_is_stripped_and_others_kept() {
        assert_eq!(
            strip_rss_param("https://j.example/a?rss=1"),
            "https://j.example/a"
        );
        assert_eq!(
            strip_rss_param("https://j.example/a?rss=1&page=2"),
            "https://j.example/a?page=2"
        );
        assert_eq!(
            strip_rss_param("https://j.example/a"),
            "https://j.example/a"
        );
    }

    #[test]
    fn date_comparison_is_strict() {
        let start: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let exactly: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let just_before: DateTime<Utc> = "2024-12-31T23:59:59.999999Z".parse().unwrap();
        assert!(!(exactly < start));
        assert!(just_before < start);
    }
}
