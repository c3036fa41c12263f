//! Multi-stage LLM enrichment for one news item:
//! answer synthesis -> specialty detection -> clinical-interest tagging ->
//! scoring -> illustrative image -> suggested questions.
//!
//! Any stage failure aborts the item, with one exception: image generation
//! is non-fatal. The record is stored without an image and a warning is
//! logged; the missing-image backfill job repairs it later.

pub mod answer;
pub mod image;
pub mod questions;
pub mod scoring;
pub mod specialties;
pub mod tags;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::imagegen::ImageGenerator;
use crate::llm::{LlmClient, LlmError};
use crate::model::{ErrorCategory, NewsElements};
use self::tags::InterestVocabulary;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("score computation failed: {0}")]
    ScoreComputationFailed(String),
}

impl EnrichError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EnrichError::Llm(e) => e.category(),
            EnrichError::ScoreComputationFailed(_) => ErrorCategory::Validation,
        }
    }
}

/// Everything the enrichment stages produce for one item.
#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub elements: NewsElements,
    pub specialties: Vec<String>,
    pub tags: Vec<String>,
    pub scores: BTreeMap<String, u32>,
    /// Maximum of `scores` values.
    pub score: u32,
    pub image_url: Option<String>,
    pub suggested_questions: Vec<String>,
}

/// Bundles the LLM and image collaborators and runs the stage sequence.
#[derive(Clone)]
pub struct Enricher {
    pub llm: Arc<dyn LlmClient>,
    pub imagegen: Arc<dyn ImageGenerator>,
}

impl Enricher {
    pub fn new(llm: Arc<dyn LlmClient>, imagegen: Arc<dyn ImageGenerator>) -> Self {
        Self { llm, imagegen }
    }

    pub async fn enrich(
        &self,
        model: &str,
        topic: &str,
        source_text: &str,
        default_specialty: &str,
        vocab: &InterestVocabulary,
    ) -> Result<Enrichment, EnrichError> {
        let llm = self.llm.as_ref();

        let elements = answer::synthesize_answer(llm, model, topic, source_text).await?;
        let specialties =
            specialties::detect_specialties(llm, model, &elements, default_specialty).await?;
        let tags = tags::select_tags(llm, model, &elements, &specialties, vocab).await?;
        let scores = scoring::score_specialties(llm, model, &elements, &specialties).await?;
        let score = scores.values().copied().max().unwrap_or(0);

        let image_url = match image::generate_illustration(
            self.imagegen.as_ref(),
            &elements.title,
        )
        .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, title = %elements.title,
                    "image generation failed; storing record without image");
                None
            }
        };

        let suggested_questions = questions::suggest_questions(llm, model, &elements).await?;

        Ok(Enrichment {
            elements,
            specialties,
            tags,
            scores,
            score,
            image_url,
            suggested_questions,
        })
    }
}
