// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod classify;
pub mod dedup;
pub mod enrich;
pub mod feeds;
pub mod imagegen;
pub mod llm;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod scrape;
pub mod storage;
pub mod unique_id;

// ---- Re-exports for stable public API ----
pub use crate::api::{create_router, AppState};
pub use crate::model::{
    EnrichedNewsRecord, ErrorCategory, ProcessingOutcome, RawFeedItem, SkipReason,
};
pub use crate::pipeline::{DrugRecord, FeedContext, IngestReport, Pipeline, RunParams};
