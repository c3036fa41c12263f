//! Per-feed and global processing statistics, built by folding outcome
//! values after the item tasks are joined. Nothing here is shared between
//! concurrent tasks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::ProcessingOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedStats {
    pub feed_url: String,
    pub source: String,
    pub items_seen: u64,
    pub processed: u64,
    /// Skip-reason label -> count.
    #[serde(default)]
    pub skipped: BTreeMap<String, u64>,
    /// Error-category label -> count.
    #[serde(default)]
    pub errors: BTreeMap<String, u64>,
    /// Set when the feed itself could not be read; items were never seen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_error: Option<String>,
}

impl FeedStats {
    pub fn new(feed_url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            feed_url: feed_url.into(),
            source: source.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: &ProcessingOutcome) {
        match outcome {
            ProcessingOutcome::Success => self.processed += 1,
            ProcessingOutcome::Skipped { reason } => {
                *self.skipped.entry(reason.as_str().to_string()).or_insert(0) += 1;
            }
            ProcessingOutcome::Error { category, .. } => {
                *self.errors.entry(category.as_str().to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn skipped_total(&self) -> u64 {
        self.skipped.values().sum()
    }

    pub fn errored_total(&self) -> u64 {
        self.errors.values().sum()
    }
}

/// Final report returned by a batch run. Produced even when individual
/// items or whole feeds failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub status: String,
    pub processed_count: u64,
    pub skipped_count: u64,
    pub message: String,
    pub feed_stats: Vec<FeedStats>,
    pub skip_reasons_summary: BTreeMap<String, u64>,
}

impl IngestReport {
    pub fn from_feed_stats(upload_id: &str, feed_stats: Vec<FeedStats>) -> Self {
        let processed_count: u64 = feed_stats.iter().map(|f| f.processed).sum();
        let skipped_count: u64 = feed_stats.iter().map(FeedStats::skipped_total).sum();
        let errored: u64 = feed_stats.iter().map(FeedStats::errored_total).sum();
        let feed_failures = feed_stats.iter().filter(|f| f.feed_error.is_some()).count();

        let mut skip_reasons_summary = BTreeMap::new();
        for fs in &feed_stats {
            for (reason, n) in &fs.skipped {
                *skip_reasons_summary.entry(reason.clone()).or_insert(0) += n;
            }
        }

        let message = format!(
            "upload {upload_id}: {processed_count} processed, {skipped_count} skipped, \
             {errored} errored, {feed_failures} feed failures"
        );

        Self {
            status: "completed".to_string(),
            processed_count,
            skipped_count,
            message,
            feed_stats,
            skip_reasons_summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorCategory, SkipReason};

    #[test]
    fn fold_accounts_for_every_outcome() {
        let mut fs = FeedStats::new("https://f.example/rss", "Feed");
        fs.items_seen = 4;
        fs.record(&ProcessingOutcome::Success);
        fs.record(&ProcessingOutcome::skipped(SkipReason::DateTooOld));
        fs.record(&ProcessingOutcome::skipped(SkipReason::DateTooOld));
        fs.record(&ProcessingOutcome::error("boom", ErrorCategory::Unknown));

        assert_eq!(fs.processed, 1);
        assert_eq!(fs.skipped_total(), 2);
        assert_eq!(fs.errored_total(), 1);
        assert_eq!(
            fs.items_seen,
            fs.processed + fs.skipped_total() + fs.errored_total()
        );
        assert_eq!(fs.skipped["date_too_old"], 2);
    }

    #[test]
    fn report_rolls_up_across_feeds() {
        let mut a = FeedStats::new("u1", "A");
        a.record(&ProcessingOutcome::Success);
        a.record(&ProcessingOutcome::skipped(SkipReason::AlreadyInSupabase));
        let mut b = FeedStats::new("u2", "B");
        b.record(&ProcessingOutcome::skipped(SkipReason::AlreadyInSupabase));
        b.feed_error = None;

        let report = IngestReport::from_feed_stats("rss_20250601T080000Z", vec![a, b]);
        assert_eq!(report.status, "completed");
        assert_eq!(report.processed_count, 1);
        assert_eq!(report.skipped_count, 2);
        assert_eq!(report.skip_reasons_summary["already_in_supabase"], 2);
        assert!(report.message.contains("rss_20250601T080000Z"));
    }
}
