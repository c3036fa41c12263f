use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use shuttle_axum::axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::feeds::catalog::{Catalog, FeedKind, FeedSource};
use crate::pipeline::{drug::domain_of, DrugRecord, IngestReport, Pipeline, RunParams};

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Pipeline,
    pub catalog: Arc<Catalog>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/ingest/rss", post(ingest_rss))
        .route("/ingest/drugs", post(ingest_drugs))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
pub struct RssBatchRequest {
    /// Explicit feed URLs; when absent the configured catalog is used.
    #[serde(default)]
    pub rss_feed_urls: Option<Vec<String>>,
    pub specialty: String,
    /// ISO date (`2025-01-01`) or full RFC 3339 instant. Required.
    pub start_date: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
}

#[derive(serde::Deserialize)]
pub struct DrugBatchRequest {
    pub records: Vec<DrugRecord>,
    pub specialty: String,
    pub start_date: String,
    /// Upper bound of the backfill window.
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub upload_id: Option<String>,
}

/// Accept a calendar date (midnight UTC) or a full instant.
pub fn parse_start_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.and_hms_opt(0, 0, 0).expect("midnight").and_utc())
        .map_err(|_| format!("invalid date `{s}`: expected YYYY-MM-DD or RFC 3339"))
}

async fn ingest_rss(
    State(state): State<AppState>,
    Json(req): Json<RssBatchRequest>,
) -> Result<Json<IngestReport>, (StatusCode, String)> {
    let start_date =
        parse_start_date(&req.start_date).map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let params = RunParams {
        specialty: req.specialty.clone(),
        start_date,
        end_date: None,
        model: req.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        upload_id: req
            .upload_id
            .unwrap_or_else(|| crate::pipeline::synthesize_upload_id(Utc::now())),
    };

    let feeds: Vec<FeedSource> = match req.rss_feed_urls {
        Some(urls) => urls
            .into_iter()
            .map(|url| FeedSource {
                source: domain_of(&url).unwrap_or_else(|| url.clone()),
                url,
                specialty: req.specialty.clone(),
                kind: FeedKind::Rss,
                accepted_news_types: Vec::new(),
                enabled: true,
            })
            .collect(),
        None => state
            .catalog
            .enabled_feeds()
            .filter(|f| f.kind == FeedKind::Rss)
            .cloned()
            .collect(),
    };

    let report = state.pipeline.run_rss_batch(&params, &feeds).await;
    Ok(Json(report))
}

async fn ingest_drugs(
    State(state): State<AppState>,
    Json(req): Json<DrugBatchRequest>,
) -> Result<Json<IngestReport>, (StatusCode, String)> {
    let start_date =
        parse_start_date(&req.start_date).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let end_date = match req.end_date.as_deref() {
        Some(s) => Some(parse_start_date(s).map_err(|e| (StatusCode::BAD_REQUEST, e))?),
        None => None,
    };

    let params = RunParams {
        specialty: req.specialty,
        start_date,
        end_date,
        model: req.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        upload_id: req
            .upload_id
            .unwrap_or_else(|| crate::pipeline::synthesize_upload_id(Utc::now())),
    };

    let report = state.pipeline.run_drug_batch(&params, req.records).await;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_only_parses_to_midnight_utc() {
        let dt = parse_start_date("2025-01-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn rfc3339_instants_are_accepted() {
        assert!(parse_start_date("2025-01-01T12:30:00Z").is_ok());
    }

    #[test]
    fn garbage_dates_are_rejected() {
        assert!(parse_start_date("yesterday").is_err());
        assert!(parse_start_date("01/01/2025").is_err());
    }
}
