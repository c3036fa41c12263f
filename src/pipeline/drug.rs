//! Drug/press-release variant of the item state machine.
//!
//! The feed entry has no usable link; an LLM extracts a press-release URL
//! and an FDA URL from title+description. The unique id is generated from
//! whichever URL is available *before* scraping so duplicates skip early.
//! Scraping tries the press-release URL first and falls back to the FDA
//! URL; if both fail the item errors as `scraping_failed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::NewsType;
use crate::dedup::{merge_checks, DuplicateChecker};
use crate::llm::{call_structured, LlmRequest, LlmTask};
use crate::model::{EnrichedNewsRecord, ErrorCategory, ProcessingOutcome, SkipReason};
use crate::scrape::{validate_sufficiency, ScrapedContent};
use crate::storage::InsertOutcome;
use crate::unique_id::{self, IdInput};

use super::item::{ItemProcessor, RunParams};

/// One drug-announcement record from the drug feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrugRecord {
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ExtractedUrls {
    #[serde(default)]
    press_release_url: Option<String>,
    #[serde(default)]
    fda_url: Option<String>,
}

impl ItemProcessor {
    pub async fn process_drug_record(
        &self,
        record: DrugRecord,
        params: &RunParams,
    ) -> ProcessingOutcome {
        if record.title.trim().is_empty() {
            return ProcessingOutcome::skipped(SkipReason::MissingUrlOrTitleOrDate);
        }
        if record.published_at < params.start_date {
            return ProcessingOutcome::skipped(SkipReason::DateTooOld);
        }
        if let Some(end) = params.end_date {
            if record.published_at > end {
                return ProcessingOutcome::skipped(SkipReason::DateTooNew);
            }
        }

        // URL extraction from title+description.
        let system = "You extract links from a drug-announcement record. Find the manufacturer \
            press-release URL and the FDA announcement URL if present. Respond with a JSON \
            object: {\"press_release_url\": \"...\"|null, \"fda_url\": \"...\"|null}.";
        let user = format!("Title: {}\nDescription: {}", record.title, record.description);
        let extracted: ExtractedUrls = match call_structured(
            self.llm.as_ref(),
            LlmRequest::new(LlmTask::UrlExtraction, system, user, &params.model),
        )
        .await
        {
            Ok(v) => v,
            Err(e) => {
                return ProcessingOutcome::error(e.to_string(), e.category());
            }
        };

        let press_url = extracted
            .press_release_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        let fda_url = extracted
            .fda_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .filter(|u| {
                let ok = u.to_ascii_lowercase().contains("fda");
                if !ok {
                    tracing::warn!(url = %u, "extracted FDA url fails the fda marker check");
                }
                ok
            });

        let Some(primary_url) = press_url.clone().or_else(|| fda_url.clone()) else {
            return ProcessingOutcome::skipped(SkipReason::NoUrlFound);
        };

        // Unique id before scraping, so known duplicates skip early.
        let news_date = record.published_at.format("%Y-%m-%d").to_string();
        let uid = match unique_id::generate(IdInput::UrlDate {
            url: &primary_url,
            news_date: &news_date,
        }) {
            Ok(uid) => uid,
            Err(e) => return ProcessingOutcome::error(e.to_string(), ErrorCategory::Validation),
        };

        let checker = DuplicateChecker::new(self.store.as_ref());
        let checks = vec![
            checker.by_unique_id(&uid).await,
            checker.by_url_and_date(&primary_url, &news_date).await,
        ];
        if self
            .settings
            .duplicate_policy
            .is_duplicate(merge_checks(&checks))
        {
            return ProcessingOutcome::skipped(SkipReason::AlreadyInSupabase);
        }

        // Press release first, FDA fallback.
        let (scraped, winning_url) = match self
            .scrape_with_fallback(press_url.as_deref(), fda_url.as_deref())
            .await
        {
            Some(hit) => hit,
            None => {
                return ProcessingOutcome::error(
                    format!("scraping_failed: no scrapeable url for `{}`", record.title),
                    ErrorCategory::ApiConnection,
                );
            }
        };

        if !validate_sufficiency(self.llm.as_ref(), &params.model, &scraped.content).await {
            return ProcessingOutcome::skipped(SkipReason::NotEnoughContent);
        }

        let enrichment = match self
            .enricher
            .enrich(
                &params.model,
                &record.title,
                &scraped.content,
                &params.specialty,
                &self.vocab,
            )
            .await
        {
            Ok(e) => e,
            Err(e) => {
                let category = e.category();
                return ProcessingOutcome::error(e.to_string(), category);
            }
        };

        let stored = EnrichedNewsRecord {
            id: None,
            unique_id: uid,
            upload_id: params.upload_id.clone(),
            doi: None,
            url: winning_url.clone(),
            news_date,
            news_date_timestamp: record.published_at,
            elements: enrichment.elements,
            news_type: Some(NewsType::FdaAnnouncement.as_str().to_string()),
            specialties: enrichment.specialties,
            tags: enrichment.tags,
            scores: enrichment.scores,
            score: enrichment.score,
            image_url: enrichment.image_url,
            extracted_image_url: None,
            extracted_image_description: None,
            suggested_questions: enrichment.suggested_questions,
            source: domain_of(&winning_url).unwrap_or_else(|| "drug_announcements".to_string()),
            selecting_model: params.model.clone(),
            is_visible_in_prod: false,
            references: None,
        };

        match self.store.insert(&stored).await {
            Ok(InsertOutcome::Inserted) => ProcessingOutcome::Success,
            Ok(InsertOutcome::DuplicateKey) => {
                ProcessingOutcome::skipped(SkipReason::AlreadyInSupabase)
            }
            Err(e) => {
                let category = e.category();
                ProcessingOutcome::error(e.to_string(), category)
            }
        }
    }

    async fn scrape_with_fallback(
        &self,
        press_url: Option<&str>,
        fda_url: Option<&str>,
    ) -> Option<(ScrapedContent, String)> {
        for url in [press_url, fda_url].into_iter().flatten() {
            match self.scraper.scrape(url).await {
                Ok(content) => return Some((content, url.to_string())),
                Err(e) => {
                    tracing::warn!(error = %e, url, "drug scrape attempt failed");
                }
            }
        }
        None
    }
}

/// Host name of a URL, `www.` stripped, used as the record's source.
pub fn domain_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1).unwrap_or(url);
    let host = rest.split(['/', '?', '#']).next()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() || !host.contains('.') || host.contains(' ') {
        None
    } else {
        Some(host.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_extraction_strips_scheme_path_and_www() {
        assert_eq!(
            domain_of("https://www.pfizer.com/news/press-release/x"),
            Some("pfizer.com".to_string())
        );
        assert_eq!(
            domain_of("https://fda.gov/announcements?id=1"),
            Some("fda.gov".to_string())
        );
        assert_eq!(domain_of("not a url"), None);
    }
}
