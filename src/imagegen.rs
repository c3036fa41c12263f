//! Illustrative-image collaborator: prompt -> hosted image URL, wrapped in
//! a bounded retry with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ErrorCategory;

/// Retry/backoff shape shared with any externally-facing bulk job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based), capped at `max_delay_ms`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mult = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let ms = (self.base_delay_ms as f64 * mult).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image generation rate limited: {0}")]
    RateLimited(String),
    #[error("image generation connection failed: {0}")]
    Connection(String),
    #[error("image api error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("image response missing url")]
    MissingUrl,
}

impl ImageError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ImageError::RateLimited(_) => ErrorCategory::RateLimit,
            ImageError::Connection(_) | ImageError::Api { .. } => ErrorCategory::ApiConnection,
            ImageError::MissingUrl => ErrorCategory::Validation,
        }
    }
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ImageError>;
}

/// OpenAI images endpoint. Requires `OPENAI_API_KEY`.
pub struct OpenAiImageGen {
    http: reqwest::Client,
    api_key: String,
    model: String,
    size: String,
    quality: String,
}

impl OpenAiImageGen {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("mednews-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            quality: "standard".to_string(),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("OPENAI_API_KEY").unwrap_or_default())
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGen {
    async fn generate(&self, prompt: &str) -> Result<String, ImageError> {
        #[derive(Serialize)]
        struct Body<'a> {
            model: &'a str,
            prompt: &'a str,
            n: u32,
            size: &'a str,
            quality: &'a str,
        }
        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Datum>,
        }
        #[derive(Deserialize)]
        struct Datum {
            url: Option<String>,
        }

        let resp = self
            .http
            .post("https://api.openai.com/v1/images/generations")
            .bearer_auth(&self.api_key)
            .json(&Body {
                model: &self.model,
                prompt,
                n: 1,
                size: &self.size,
                quality: &self.quality,
            })
            .send()
            .await
            .map_err(|e| ImageError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ImageError::RateLimited(
                resp.text().await.unwrap_or_default(),
            ));
        }
        if !status.is_success() {
            return Err(ImageError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }

        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| ImageError::Connection(e.to_string()))?;
        parsed
            .data
            .into_iter()
            .next()
            .and_then(|d| d.url)
            .ok_or(ImageError::MissingUrl)
    }
}

/// Wraps any generator with the configured retry/backoff policy.
pub struct RetryingImageGen<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: ImageGenerator> RetryingImageGen<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: ImageGenerator> ImageGenerator for RetryingImageGen<G> {
    async fn generate(&self, prompt: &str) -> Result<String, ImageError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.inner.generate(prompt).await {
                Ok(url) => return Ok(url),
                Err(e) => {
                    if attempt > self.policy.max_retries {
                        return Err(e);
                    }
                    tracing::warn!(error = %e, attempt, "image generation failed; retrying");
                    tokio::time::sleep(self.policy.delay_for(attempt)).await;
                }
            }
        }
    }
}
