// tests/drug_pipeline.rs
// Drug-announcement variant: URL extraction, FDA marker validation,
// press-release-first scraping with FDA fallback, and the both-fail error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use mednews_pipeline::enrich::tags::InterestVocabulary;
use mednews_pipeline::enrich::Enricher;
use mednews_pipeline::feeds::catalog::PipelineSettings;
use mednews_pipeline::imagegen::{ImageError, ImageGenerator};
use mednews_pipeline::llm::{LlmClient, LlmError, LlmRequest, LlmTask};
use mednews_pipeline::model::{
    EnrichedNewsRecord, ErrorCategory, ProcessingOutcome, SkipReason,
};
use mednews_pipeline::pipeline::{DrugRecord, ItemProcessor, RunParams};
use mednews_pipeline::scrape::{ScrapeError, ScrapedContent, Scraper};
use mednews_pipeline::storage::{InsertOutcome, NewsStore, StoreError};

struct MockLlm {
    press_url: Option<&'static str>,
    fda_url: Option<&'static str>,
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn call_json(&self, req: LlmRequest) -> Result<Value, LlmError> {
        match req.task {
            LlmTask::UrlExtraction => Ok(json!({
                "press_release_url": self.press_url,
                "fda_url": self.fda_url
            })),
            LlmTask::SufficiencyCheck => Ok(json!({ "sufficient": true })),
            LlmTask::AnswerSynthesis => Ok(json!({
                "title": "FDA approves Drug Y",
                "bullet_points": ["First-in-class approval"],
                "paragraphs": ["The FDA approved Drug Y for adults."]
            })),
            LlmTask::SpecialtyDetection => Ok(json!({ "specialties": ["Cardiology"] })),
            LlmTask::InterestTagging => Ok(json!({ "tags": ["heart failure"] })),
            LlmTask::Scoring => Ok(json!({
                "Cardiology": { "trust": 2, "clinical_impact": 3, "tricky_diagnosis": 1 }
            })),
            LlmTask::SuggestedQuestions => Ok(json!({
                "questions": ["Who is eligible?", "What is the dosing?", "What are the risks?"]
            })),
            _ => Err(LlmError::Parse("unexpected task".into())),
        }
    }
    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Scrapes succeed only for URLs containing one of `working` substrings.
struct SelectiveScraper {
    working: Vec<&'static str>,
    attempts: Mutex<Vec<String>>,
}

#[async_trait]
impl Scraper for SelectiveScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedContent, ScrapeError> {
        self.attempts.lock().unwrap().push(url.to_string());
        if self.working.iter().any(|w| url.contains(w)) {
            Ok(ScrapedContent {
                title: "FDA approves Drug Y".to_string(),
                content: "The Food and Drug Administration today approved Drug Y for the \
                          treatment of chronic heart failure in adults. "
                    .repeat(8),
                content_type: Some("article".to_string()),
            })
        } else {
            Err(ScrapeError::Upstream {
                status: 503,
                url: url.to_string(),
            })
        }
    }
}

#[derive(Default)]
struct MemStore {
    rows: Mutex<Vec<EnrichedNewsRecord>>,
}

#[async_trait]
impl NewsStore for MemStore {
    async fn insert(&self, record: &EnrichedNewsRecord) -> Result<InsertOutcome, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|r| r.unique_id == record.unique_id) {
            return Ok(InsertOutcome::DuplicateKey);
        }
        rows.push(record.clone());
        Ok(InsertOutcome::Inserted)
    }
    async fn find_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<EnrichedNewsRecord>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.unique_id == unique_id)
            .cloned())
    }
    async fn find_by_url_and_date(
        &self,
        url: &str,
        news_date: &str,
    ) -> Result<Option<EnrichedNewsRecord>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.url == url && r.news_date == news_date)
            .cloned())
    }
    async fn set_suggested_questions(&self, _id: i64, _q: &[String]) -> Result<(), StoreError> {
        Ok(())
    }
    async fn set_image_url(&self, _id: i64, _u: &str) -> Result<(), StoreError> {
        Ok(())
    }
    async fn query_by_tags_overlap(
        &self,
        _tags: &[String],
        _visible_only: bool,
        _limit: u32,
    ) -> Result<Vec<EnrichedNewsRecord>, StoreError> {
        Ok(Vec::new())
    }
}

struct StaticImage {
    calls: AtomicUsize,
}

#[async_trait]
impl ImageGenerator for StaticImage {
    async fn generate(&self, _prompt: &str) -> Result<String, ImageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("https://img.example/drug.png".to_string())
    }
}

fn processor(
    llm: MockLlm,
    working: Vec<&'static str>,
) -> (ItemProcessor, Arc<MemStore>, Arc<SelectiveScraper>) {
    let llm = Arc::new(llm);
    let scraper = Arc::new(SelectiveScraper {
        working,
        attempts: Mutex::new(Vec::new()),
    });
    let store = Arc::new(MemStore::default());
    let imagegen = Arc::new(StaticImage {
        calls: AtomicUsize::new(0),
    });

    let mut vocab = InterestVocabulary::new();
    vocab.insert(
        "Cardiology".to_string(),
        vec!["heart failure".to_string()],
    );

    let p = ItemProcessor {
        llm: llm.clone(),
        scraper: scraper.clone(),
        store: store.clone(),
        enricher: Enricher::new(llm, imagegen),
        settings: PipelineSettings::default(),
        vocab: Arc::new(vocab),
    };
    (p, store, scraper)
}

fn record() -> DrugRecord {
    DrugRecord {
        title: "FDA approves Drug Y for heart failure".to_string(),
        description: "See https://pharma.example/press/drug-y and the FDA notice.".to_string(),
        published_at: "2025-06-10T12:00:00Z".parse().unwrap(),
    }
}

fn params() -> RunParams {
    RunParams {
        specialty: "Cardiology".to_string(),
        start_date: "2025-06-01T00:00:00Z".parse().unwrap(),
        end_date: Some("2025-06-30T23:59:59Z".parse().unwrap()),
        model: "mock-model".to_string(),
        upload_id: "rss_20250610T120000Z".to_string(),
    }
}

#[tokio::test]
async fn press_release_failure_falls_back_to_fda_url() {
    let (p, store, scraper) = processor(
        MockLlm {
            press_url: Some("https://pharma.example/press/drug-y"),
            fda_url: Some("https://www.fda.gov/news/drug-y"),
        },
        vec!["fda.gov"],
    );

    let outcome = p.process_drug_record(record(), &params()).await;
    assert_eq!(outcome, ProcessingOutcome::Success);

    let attempts = scraper.attempts.lock().unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[0].contains("pharma.example"));
    assert!(attempts[1].contains("fda.gov"));

    let rows = store.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    let rec = &rows[0];
    // Winning URL determines the stored url and source domain.
    assert_eq!(rec.url, "https://www.fda.gov/news/drug-y");
    assert_eq!(rec.source, "fda.gov");
    assert_eq!(rec.news_type.as_deref(), Some("fda_announcement"));
    assert!(rec.unique_id.starts_with("url-"));
    assert_eq!(rec.news_date, "2025-06-10");
}

#[tokio::test]
async fn both_scrapes_failing_is_a_connection_error() {
    let (p, store, _) = processor(
        MockLlm {
            press_url: Some("https://pharma.example/press/drug-y"),
            fda_url: Some("https://www.fda.gov/news/drug-y"),
        },
        vec![],
    );

    let outcome = p.process_drug_record(record(), &params()).await;
    match outcome {
        ProcessingOutcome::Error { message, category } => {
            assert!(message.contains("scraping_failed"));
            assert_eq!(category, ErrorCategory::ApiConnection);
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(store.rows.lock().unwrap().is_empty());
}

#[tokio::test]
async fn extraction_without_urls_skips_as_no_url_found() {
    let (p, _, scraper) = processor(
        MockLlm {
            press_url: None,
            fda_url: None,
        },
        vec![],
    );

    let outcome = p.process_drug_record(record(), &params()).await;
    assert_eq!(
        outcome,
        ProcessingOutcome::Skipped {
            reason: SkipReason::NoUrlFound
        }
    );
    assert!(scraper.attempts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fda_url_without_fda_marker_is_rejected() {
    // The only extracted URL lacks the "fda" marker, so after validation
    // nothing remains to scrape.
    let (p, _, scraper) = processor(
        MockLlm {
            press_url: None,
            fda_url: Some("https://example.com/announcement"),
        },
        vec!["example.com"],
    );

    let outcome = p.process_drug_record(record(), &params()).await;
    assert_eq!(
        outcome,
        ProcessingOutcome::Skipped {
            reason: SkipReason::NoUrlFound
        }
    );
    assert!(scraper.attempts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn records_outside_the_window_skip_before_extraction() {
    let (p, _, _) = processor(
        MockLlm {
            press_url: Some("https://pharma.example/press/drug-y"),
            fda_url: None,
        },
        vec!["pharma.example"],
    );

    let mut old = record();
    old.published_at = "2025-05-01T00:00:00Z".parse().unwrap();
    assert_eq!(
        p.process_drug_record(old, &params()).await,
        ProcessingOutcome::Skipped {
            reason: SkipReason::DateTooOld
        }
    );

    let mut future = record();
    future.published_at = "2025-07-15T00:00:00Z".parse().unwrap();
    assert_eq!(
        p.process_drug_record(future, &params()).await,
        ProcessingOutcome::Skipped {
            reason: SkipReason::DateTooNew
        }
    );
}

#[tokio::test]
async fn rerunning_a_drug_record_skips_as_duplicate() {
    let (p, store, _) = processor(
        MockLlm {
            press_url: Some("https://pharma.example/press/drug-y"),
            fda_url: None,
        },
        vec!["pharma.example"],
    );

    assert_eq!(
        p.process_drug_record(record(), &params()).await,
        ProcessingOutcome::Success
    );
    assert_eq!(
        p.process_drug_record(record(), &params()).await,
        ProcessingOutcome::Skipped {
            reason: SkipReason::AlreadyInSupabase
        }
    );
    assert_eq!(store.rows.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_title_skips_as_missing_fields() {
    let (p, _, _) = processor(
        MockLlm {
            press_url: None,
            fda_url: None,
        },
        vec![],
    );

    let mut blank = record();
    blank.title = "   ".to_string();
    assert_eq!(
        p.process_drug_record(blank, &params()).await,
        ProcessingOutcome::Skipped {
            reason: SkipReason::MissingUrlOrTitleOrDate
        }
    );
}
