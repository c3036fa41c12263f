//! Medical-News Pipeline — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the feed catalog, collaborators,
//! and the batch ingestion routes.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mednews_pipeline::api::{create_router, AppState};
use mednews_pipeline::enrich::tags::DEFAULT_VOCABULARY;
use mednews_pipeline::feeds::catalog::load_catalog_default;
use mednews_pipeline::feeds::HttpFeedFetcher;
use mednews_pipeline::imagegen::{OpenAiImageGen, RetryingImageGen};
use mednews_pipeline::llm::OpenAiLlm;
use mednews_pipeline::pipeline::Pipeline;
use mednews_pipeline::scrape::HttpScraper;
use mednews_pipeline::storage::SupabaseStore;

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - NEWS_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("NEWS_DEV_LOG").ok().is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mednews_pipeline=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    enable_dev_tracing();

    let catalog = load_catalog_default().expect("Failed to load feed catalog");
    let settings = catalog.pipeline;

    let metrics = mednews_pipeline::metrics::Metrics::init(settings.item_concurrency);

    let store = SupabaseStore::from_env().expect("Supabase credentials missing");
    let pipeline = Pipeline {
        llm: Arc::new(OpenAiLlm::from_env()),
        scraper: Arc::new(HttpScraper::new()),
        store: Arc::new(store),
        imagegen: Arc::new(RetryingImageGen::new(
            OpenAiImageGen::from_env(),
            settings.retry,
        )),
        fetcher: Arc::new(HttpFeedFetcher::new()),
        settings,
        vocab: Arc::new(DEFAULT_VOCABULARY.clone()),
    };

    let state = AppState {
        pipeline,
        catalog: Arc::new(catalog),
    };
    let router = create_router(state).merge(metrics.router());

    Ok(router.into())
}
