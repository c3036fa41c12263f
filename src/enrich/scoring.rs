//! Multi-axis scoring: per detected specialty, three 1–3 integer sub-scores
//! (trust, clinical impact, tricky diagnosis) whose sum (max 9) is the
//! specialty score. Non-numeric sub-scores fail the stage.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::enrich::EnrichError;
use crate::llm::{LlmClient, LlmRequest, LlmTask};
use crate::model::NewsElements;

const AXES: &[&str] = &["trust", "clinical_impact", "tricky_diagnosis"];

/// Ask for sub-scores for every specialty and sum each triple.
pub async fn score_specialties(
    llm: &dyn LlmClient,
    model: &str,
    elements: &NewsElements,
    specialties: &[String],
) -> Result<BTreeMap<String, u32>, EnrichError> {
    if specialties.is_empty() {
        return Ok(BTreeMap::new());
    }

    let system = "You score a clinical-news summary for each listed specialty on three axes, \
        each an integer from 1 to 3: trust (source and study quality), clinical_impact \
        (practice-changing weight), tricky_diagnosis (diagnostic subtlety). Respond with a \
        JSON object keyed by specialty, e.g. {\"Cardiology\": {\"trust\": 3, \
        \"clinical_impact\": 2, \"tricky_diagnosis\": 1}}.";
    let user = format!(
        "Specialties: {}\nTitle: {}\nKey points: {}",
        specialties.join(", "),
        elements.title,
        elements.bullet_points.join("; ")
    );

    let raw = llm
        .call_json(LlmRequest::new(LlmTask::Scoring, system, user, model))
        .await
        .map_err(EnrichError::Llm)?;

    sum_sub_scores(&raw, specialties)
}

/// Fold the raw per-axis object into summed specialty scores.
/// Fails if any expected sub-score is absent or non-numeric.
pub fn sum_sub_scores(
    raw: &Value,
    specialties: &[String],
) -> Result<BTreeMap<String, u32>, EnrichError> {
    let mut out = BTreeMap::new();
    for sp in specialties {
        let entry = raw.get(sp).ok_or_else(|| {
            EnrichError::ScoreComputationFailed(format!("missing scores for specialty {sp}"))
        })?;
        let mut total = 0u32;
        for axis in AXES {
            let v = entry.get(axis).and_then(Value::as_i64).ok_or_else(|| {
                EnrichError::ScoreComputationFailed(format!(
                    "non-numeric sub-score `{axis}` for specialty {sp}"
                ))
            })?;
            total += v.clamp(1, 3) as u32;
        }
        out.insert(sp.clone(), total);
    }
    Ok(out)
}
