//! Specialty detection against a fixed clinical taxonomy.

use serde::Deserialize;

use crate::llm::{call_structured, LlmClient, LlmError, LlmRequest, LlmTask};
use crate::model::NewsElements;

/// The fixed clinical-specialty taxonomy used for audience targeting.
pub const SPECIALTIES: &[&str] = &[
    "Cardiology",
    "Pulmonology",
    "Neurology",
    "Oncology",
    "Endocrinology",
    "Gastroenterology",
    "Infectious Diseases",
    "Rheumatology",
    "Nephrology",
    "Hematology",
    "Dermatology",
    "Psychiatry",
    "Pediatrics",
    "Geriatrics",
    "Emergency Medicine",
    "General Medicine",
];

/// Case-insensitive lookup of the canonical taxonomy label.
pub fn canonical_specialty(label: &str) -> Option<&'static str> {
    let t = label.trim();
    SPECIALTIES
        .iter()
        .find(|s| s.eq_ignore_ascii_case(t))
        .copied()
}

#[derive(Debug, Deserialize)]
struct SpecialtyAnswer {
    #[serde(default)]
    specialties: Vec<String>,
}

/// Tag the synthesized answer with the subset of the taxonomy for which the
/// finding is genuinely practice-changing. The caller's contextual specialty
/// is always unioned in.
pub async fn detect_specialties(
    llm: &dyn LlmClient,
    model: &str,
    elements: &NewsElements,
    default_specialty: &str,
) -> Result<Vec<String>, LlmError> {
    let system = format!(
        "You map a clinical-news summary onto medical specialties. Choose only from this list, \
         and only specialties for which the finding is genuinely practice-changing: {}. \
         Respond with a JSON object: {{\"specialties\": [\"...\"]}}.",
        SPECIALTIES.join(", ")
    );
    let user = format!(
        "Title: {}\nKey points: {}",
        elements.title,
        elements.bullet_points.join("; ")
    );

    let answer: SpecialtyAnswer = call_structured(
        llm,
        LlmRequest::new(LlmTask::SpecialtyDetection, system, user, model),
    )
    .await?;

    // Keep only taxonomy members, canonicalized, ordered, deduplicated.
    let mut out: Vec<String> = Vec::new();
    for raw in &answer.specialties {
        if let Some(canon) = canonical_specialty(raw) {
            if !out.iter().any(|s| s == canon) {
                out.push(canon.to_string());
            }
        } else {
            tracing::warn!(specialty = %raw, "classifier returned a label outside the taxonomy");
        }
    }

    if let Some(canon) = canonical_specialty(default_specialty) {
        if !out.iter().any(|s| s == canon) {
            out.push(canon.to_string());
        }
    } else if !default_specialty.trim().is_empty() {
        tracing::warn!(specialty = %default_specialty, "default specialty not in taxonomy");
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedSpecialties(Value);

    #[async_trait]
    impl LlmClient for FixedSpecialties {
        async fn call_json(&self, _req: LlmRequest) -> Result<Value, LlmError> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn elements() -> NewsElements {
        NewsElements {
            title: "New anticoagulant reduces stroke".to_string(),
            bullet_points: vec!["lower stroke risk".to_string()],
            paragraphs: vec![],
        }
    }

    #[tokio::test]
    async fn default_specialty_is_always_unioned_in() {
        let llm = FixedSpecialties(json!({"specialties": ["Cardiology"]}));
        let out = detect_specialties(&llm, "m", &elements(), "Neurology")
            .await
            .unwrap();
        assert_eq!(out, vec!["Cardiology".to_string(), "Neurology".to_string()]);
    }

    #[tokio::test]
    async fn labels_outside_the_taxonomy_are_dropped() {
        let llm = FixedSpecialties(json!({"specialties": ["Cardiology", "Astrology"]}));
        let out = detect_specialties(&llm, "m", &elements(), "cardiology")
            .await
            .unwrap();
        assert_eq!(out, vec!["Cardiology".to_string()]);
    }

    #[test]
    fn canonical_lookup_is_case_insensitive() {
        assert_eq!(canonical_specialty("  pulmonology "), Some("Pulmonology"));
        assert_eq!(canonical_specialty("Astrology"), None);
    }
}
