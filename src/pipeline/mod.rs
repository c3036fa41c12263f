//! Batch orchestration: iterate configured feeds, fan item processing out
//! with bounded concurrency, fold outcomes into statistics, report.
//!
//! Feeds are isolated from each other: a feed whose document cannot be
//! read is logged and counted, and the batch continues. Item tasks return
//! outcome values; statistics are folded by this task after joining, so no
//! counter is mutated from concurrent task bodies.

pub mod drug;
pub mod item;
pub mod stats;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use once_cell::sync::OnceCell;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::enrich::tags::InterestVocabulary;
use crate::enrich::Enricher;
use crate::feeds::catalog::{FeedSource, PipelineSettings};
use crate::feeds::{read_feed, FeedFetcher};
use crate::imagegen::ImageGenerator;
use crate::llm::LlmClient;
use crate::model::ProcessingOutcome;
use crate::scrape::Scraper;
use crate::storage::NewsStore;

pub use drug::DrugRecord;
pub use item::{FeedContext, ItemProcessor, RunParams};
pub use stats::{FeedStats, IngestReport};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("news_items_total", "Items seen across all feeds.");
        describe_counter!("news_items_processed_total", "Items enriched and stored.");
        describe_counter!("news_items_skipped_total", "Items skipped, by reason.");
        describe_counter!("news_items_errored_total", "Items failed, by category.");
        describe_counter!("news_feed_errors_total", "Feeds whose document could not be read.");
        describe_histogram!("news_item_process_ms", "Per-item processing time in milliseconds.");
        describe_gauge!("news_ingest_last_run_ts", "Unix ts when a batch last finished.");
    });
}

fn record_outcome_metrics(outcome: &ProcessingOutcome) {
    match outcome {
        ProcessingOutcome::Success => {
            counter!("news_items_processed_total").increment(1);
        }
        ProcessingOutcome::Skipped { reason } => {
            counter!("news_items_skipped_total", "reason" => reason.as_str()).increment(1);
        }
        ProcessingOutcome::Error { category, .. } => {
            counter!("news_items_errored_total", "category" => category.as_str()).increment(1);
        }
    }
}

/// Synthesized batch identifier: `rss_<compact ISO timestamp>`.
pub fn synthesize_upload_id(now: DateTime<Utc>) -> String {
    format!("rss_{}", now.format("%Y%m%dT%H%M%SZ"))
}

/// All collaborators wired together; the unit the HTTP surface holds.
#[derive(Clone)]
pub struct Pipeline {
    pub llm: Arc<dyn LlmClient>,
    pub scraper: Arc<dyn Scraper>,
    pub store: Arc<dyn NewsStore>,
    pub imagegen: Arc<dyn ImageGenerator>,
    pub fetcher: Arc<dyn FeedFetcher>,
    pub settings: PipelineSettings,
    pub vocab: Arc<InterestVocabulary>,
}

impl Pipeline {
    fn processor(&self) -> ItemProcessor {
        ItemProcessor {
            llm: Arc::clone(&self.llm),
            scraper: Arc::clone(&self.scraper),
            store: Arc::clone(&self.store),
            enricher: Enricher::new(Arc::clone(&self.llm), Arc::clone(&self.imagegen)),
            settings: self.settings,
            vocab: Arc::clone(&self.vocab),
        }
    }

    /// Run the RSS batch over the given feeds. Always returns a report,
    /// even when individual items or whole feeds failed.
    pub async fn run_rss_batch(&self, params: &RunParams, feeds: &[FeedSource]) -> IngestReport {
        ensure_metrics_described();
        let params = Arc::new(params.clone());
        let processor = self.processor();
        let mut all_stats: Vec<FeedStats> = Vec::with_capacity(feeds.len());

        for feed in feeds.iter().filter(|f| f.enabled) {
            let mut fs = FeedStats::new(&feed.url, &feed.source);

            let items = match read_feed(self.fetcher.as_ref(), &feed.url).await {
                Ok(items) => items,
                Err(e) => {
                    tracing::warn!(error = ?e, feed = %feed.url, "feed read failed; continuing batch");
                    counter!("news_feed_errors_total").increment(1);
                    fs.feed_error = Some(e.to_string());
                    all_stats.push(fs);
                    continue;
                }
            };

            fs.items_seen = items.len() as u64;
            counter!("news_items_total").increment(items.len() as u64);

            let context = Arc::new(FeedContext {
                source: feed.source.clone(),
                specialty: feed.specialty.clone(),
                accepted_news_types: feed.accepted_news_types.clone(),
            });

            // Bounded fan-out: items of one feed run concurrently, capped by
            // the semaphore so third-party APIs are not hammered.
            let limiter = Arc::new(Semaphore::new(self.settings.item_concurrency.max(1)));
            let mut tasks: JoinSet<ProcessingOutcome> = JoinSet::new();
            for item in items {
                let processor = processor.clone();
                let params = Arc::clone(&params);
                let context = Arc::clone(&context);
                let limiter = Arc::clone(&limiter);
                tasks.spawn(async move {
                    let _permit = limiter.acquire_owned().await.expect("semaphore open");
                    let t0 = std::time::Instant::now();
                    let outcome = processor.process_item(item, &params, &context).await;
                    histogram!("news_item_process_ms")
                        .record(t0.elapsed().as_secs_f64() * 1_000.0);
                    outcome
                });
            }

            // Single-threaded fold after gathering; unordered completion.
            while let Some(joined) = tasks.join_next().await {
                let outcome = match joined {
                    Ok(outcome) => outcome,
                    Err(e) => ProcessingOutcome::error(
                        format!("item task panicked: {e}"),
                        crate::model::ErrorCategory::Unknown,
                    ),
                };
                record_outcome_metrics(&outcome);
                fs.record(&outcome);
            }

            tracing::info!(
                feed = %feed.url,
                seen = fs.items_seen,
                processed = fs.processed,
                skipped = fs.skipped_total(),
                errored = fs.errored_total(),
                "feed done"
            );
            all_stats.push(fs);
        }

        gauge!("news_ingest_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        IngestReport::from_feed_stats(&params.upload_id, all_stats)
    }

    /// Run the drug/press-release batch over explicit records.
    pub async fn run_drug_batch(
        &self,
        params: &RunParams,
        records: Vec<DrugRecord>,
    ) -> IngestReport {
        ensure_metrics_described();
        let params = Arc::new(params.clone());
        let processor = self.processor();

        let mut fs = FeedStats::new("drug_announcements", "drug_announcements");
        fs.items_seen = records.len() as u64;
        counter!("news_items_total").increment(records.len() as u64);

        let limiter = Arc::new(Semaphore::new(self.settings.item_concurrency.max(1)));
        let mut tasks: JoinSet<ProcessingOutcome> = JoinSet::new();
        for record in records {
            let processor = processor.clone();
            let params = Arc::clone(&params);
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                let _permit = limiter.acquire_owned().await.expect("semaphore open");
                processor.process_drug_record(record, &params).await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => ProcessingOutcome::error(
                    format!("item task panicked: {e}"),
                    crate::model::ErrorCategory::Unknown,
                ),
            };
            record_outcome_metrics(&outcome);
            fs.record(&outcome);
        }

        gauge!("news_ingest_last_run_ts").set(Utc::now().timestamp().max(0) as f64);
        IngestReport::from_feed_stats(&params.upload_id, vec![fs])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_id_has_the_compact_timestamp_shape() {
        let now: DateTime<Utc> = "2025-06-01T08:15:30Z".parse().unwrap();
        assert_eq!(synthesize_upload_id(now), "rss_20250601T081530Z");
    }
}
