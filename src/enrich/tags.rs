//! Clinical-interest tagging, scoped to the specialty vocabulary.
//!
//! The model may only return tags present in the vocabulary handed to it;
//! everything else is filtered out. Empty result is a valid outcome.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::llm::{call_structured, LlmClient, LlmError, LlmRequest, LlmTask};
use crate::model::NewsElements;

/// Specialty label -> its curated clinical-interest vocabulary.
pub type InterestVocabulary = BTreeMap<String, Vec<String>>;

/// Bundled default vocabulary; deployments may pass their own.
pub static DEFAULT_VOCABULARY: Lazy<InterestVocabulary> = Lazy::new(|| {
    let raw = include_str!("../../clinical_interests.json");
    serde_json::from_str(raw).expect("valid clinical interests vocabulary")
});

/// Candidate tags for the given specialties: the union of their
/// vocabularies, deduplicated.
pub fn candidate_interests(vocab: &InterestVocabulary, specialties: &[String]) -> Vec<String> {
    let mut set = BTreeSet::new();
    for sp in specialties {
        if let Some(interests) = vocab.get(sp) {
            for i in interests {
                set.insert(i.clone());
            }
        }
    }
    set.into_iter().collect()
}

/// Keep only tags present in the candidate vocabulary (case-insensitive
/// match, canonical casing preserved), set semantics.
pub fn filter_to_vocabulary(raw_tags: &[String], candidates: &[String]) -> Vec<String> {
    let mut out = BTreeSet::new();
    for raw in raw_tags {
        let t = raw.trim();
        if let Some(canon) = candidates.iter().find(|c| c.eq_ignore_ascii_case(t)) {
            out.insert(canon.clone());
        }
    }
    out.into_iter().collect()
}

#[derive(Debug, Deserialize)]
struct TagAnswer {
    #[serde(default)]
    tags: Vec<String>,
}

/// Ask for the interests strictly and directly relevant to the answer.
/// Returns a subset of the contributing specialties' vocabularies.
pub async fn select_tags(
    llm: &dyn LlmClient,
    model: &str,
    elements: &NewsElements,
    specialties: &[String],
    vocab: &InterestVocabulary,
) -> Result<Vec<String>, LlmError> {
    let candidates = candidate_interests(vocab, specialties);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let system = format!(
        "You tag a clinical-news summary with clinical interests. Choose only interests that \
         are strictly and directly relevant, only from this vocabulary: {}. An empty list is \
         acceptable. Respond with a JSON object: {{\"tags\": [\"...\"]}}.",
        candidates.join(", ")
    );
    let user = format!(
        "Title: {}\nKey points: {}",
        elements.title,
        elements.bullet_points.join("; ")
    );

    let answer: TagAnswer =
        call_structured(llm, LlmRequest::new(LlmTask::InterestTagging, system, user, model)).await?;

    Ok(filter_to_vocabulary(&answer.tags, &candidates))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> InterestVocabulary {
        let mut v = InterestVocabulary::new();
        v.insert(
            "Pulmonology".to_string(),
            vec!["asthma".to_string(), "COPD".to_string()],
        );
        v.insert(
            "Cardiology".to_string(),
            vec!["heart failure".to_string(), "COPD".to_string()],
        );
        v
    }

    #[test]
    fn candidates_union_across_specialties_with_set_semantics() {
        let c = candidate_interests(
            &vocab(),
            &["Pulmonology".to_string(), "Cardiology".to_string()],
        );
        assert_eq!(c, vec!["COPD", "asthma", "heart failure"]);
    }

    #[test]
    fn filter_drops_invented_tags() {
        let candidates = vec!["asthma".to_string(), "COPD".to_string()];
        let raw = vec![
            "Asthma".to_string(),
            "copd".to_string(),
            "made-up-tag".to_string(),
        ];
        let out = filter_to_vocabulary(&raw, &candidates);
        assert_eq!(out, vec!["COPD".to_string(), "asthma".to_string()]);
    }

    #[test]
    fn default_vocabulary_loads_and_covers_taxonomy_entries() {
        assert!(DEFAULT_VOCABULARY.contains_key("Cardiology"));
        assert!(DEFAULT_VOCABULARY.contains_key("Pulmonology"));
        assert!(DEFAULT_VOCABULARY
            .get("Pulmonology")
            .is_some_and(|v| v.iter().any(|t| t == "asthma")));
    }

    #[test]
    fn no_specialties_means_no_candidates() {
        assert!(candidate_interests(&vocab(), &[]).is_empty());
    }
}
