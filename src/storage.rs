//! Persistence gateway for enriched news records.
//!
//! Records live in a Supabase (PostgREST) table with a uniqueness constraint
//! on `unique_id`. The constraint violation on insert is the canonical
//! duplicate signal; the pre-insert duplicate check is only a cost-saving
//! optimization.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{EnrichedNewsRecord, ErrorCategory};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store api error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("store row decode failed: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
}

impl StoreError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            StoreError::Connection(_) | StoreError::Api { .. } => ErrorCategory::ApiConnection,
            StoreError::Decode(_) => ErrorCategory::Validation,
            StoreError::NotFound(_) => ErrorCategory::Validation,
        }
    }
}

/// Result of an insert attempt. `DuplicateKey` maps a unique-constraint
/// violation to the duplicate skip path, never to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    DuplicateKey,
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    async fn insert(&self, record: &EnrichedNewsRecord) -> Result<InsertOutcome, StoreError>;
    async fn find_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<EnrichedNewsRecord>, StoreError>;
    /// Legacy lookup for rows predating unique-id adoption.
    async fn find_by_url_and_date(
        &self,
        url: &str,
        news_date: &str,
    ) -> Result<Option<EnrichedNewsRecord>, StoreError>;
    async fn set_suggested_questions(
        &self,
        id: i64,
        questions: &[String],
    ) -> Result<(), StoreError>;
    async fn set_image_url(&self, id: i64, image_url: &str) -> Result<(), StoreError>;
    /// Records whose tags overlap `tags`, ordered score desc then date desc.
    async fn query_by_tags_overlap(
        &self,
        tags: &[String],
        visible_only: bool,
        limit: u32,
    ) -> Result<Vec<EnrichedNewsRecord>, StoreError>;
}

/// Supabase REST (PostgREST) implementation.
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    service_key: String,
    table: String,
}

impl SupabaseStore {
    pub fn new(base_url: String, service_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("mednews-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            table: "news".to_string(),
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .map_err(|_| anyhow::anyhow!("SUPABASE_URL not set"))?;
        let service_key = std::env::var("SUPABASE_SERVICE_KEY")
            .map_err(|_| anyhow::anyhow!("SUPABASE_SERVICE_KEY not set"))?;
        Ok(Self::new(base_url, service_key))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authed(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    async fn fetch_rows(
        &self,
        query: &[(&str, String)],
    ) -> Result<Vec<EnrichedNewsRecord>, StoreError> {
        let resp = self
            .authed(self.http.get(self.table_url()).query(query))
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(StoreError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl NewsStore for SupabaseStore {
    async fn insert(&self, record: &EnrichedNewsRecord) -> Result<InsertOutcome, StoreError> {
        let resp = self
            .authed(self.http.post(self.table_url()))
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(InsertOutcome::Inserted);
        }
        let body = resp.text().await.unwrap_or_default();
        // PostgREST reports a unique violation as 409 with SQLSTATE 23505.
        if status.as_u16() == 409 || body.contains("23505") {
            return Ok(InsertOutcome::DuplicateKey);
        }
        Err(StoreError::Api {
            status: status.as_u16(),
            body,
        })
    }

    async fn find_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<EnrichedNewsRecord>, StoreError> {
        let rows = self
            .fetch_rows(&[
                ("unique_id", format!("eq.{unique_id}")),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_by_url_and_date(
        &self,
        url: &str,
        news_date: &str,
    ) -> Result<Option<EnrichedNewsRecord>, StoreError> {
        let rows = self
            .fetch_rows(&[
                ("url", format!("eq.{url}")),
                ("news_date", format!("eq.{news_date}")),
                ("limit", "1".to_string()),
            ])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn set_suggested_questions(
        &self,
        id: i64,
        questions: &[String],
    ) -> Result<(), StoreError> {
        self.patch_by_id(id, serde_json::json!({ "suggested_questions": questions }))
            .await
    }

    async fn set_image_url(&self, id: i64, image_url: &str) -> Result<(), StoreError> {
        self.patch_by_id(id, serde_json::json!({ "imageUrl": image_url }))
            .await
    }

    async fn query_by_tags_overlap(
        &self,
        tags: &[String],
        visible_only: bool,
        limit: u32,
    ) -> Result<Vec<EnrichedNewsRecord>, StoreError> {
        let overlap = format!("ov.{{{}}}", tags.join(","));
        let mut query: Vec<(&str, String)> = vec![
            ("tags", overlap),
            ("order", "score.desc,news_date_timestamp.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if visible_only {
            query.push(("is_visible_in_prod", "eq.true".to_string()));
        }
        self.fetch_rows(&query).await
    }
}

impl SupabaseStore {
    async fn patch_by_id(&self, id: i64, body: serde_json::Value) -> Result<(), StoreError> {
        let resp = self
            .authed(
                self.http
                    .patch(self.table_url())
                    .query(&[("id", format!("eq.{id}"))]),
            )
            .header("Prefer", "return=minimal")
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 {
            Err(StoreError::NotFound(format!("id {id}")))
        } else {
            Err(StoreError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_carry_categories() {
        assert_eq!(
            StoreError::Connection("refused".into()).category(),
            ErrorCategory::ApiConnection
        );
        assert_eq!(
            StoreError::Decode("bad row".into()).category(),
            ErrorCategory::Validation
        );
    }
}
