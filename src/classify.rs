//! Content classification: the LLM scientific-paper gate (run before any
//! expensive work) and the deterministic keyword subtype classifier (run
//! after full content is available).

use serde::{Deserialize, Serialize};

use crate::llm::{call_structured, LlmClient, LlmError, LlmRequest, LlmTask};

/// Gate verdict for a candidate item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub is_scientific_paper: bool,
    #[serde(default)]
    pub reasoning: String,
}

/// Fast pre-filter: is this worth the expensive pipeline at all?
pub async fn scientific_paper_gate(
    llm: &dyn LlmClient,
    model: &str,
    title: &str,
    description: &str,
    url: &str,
) -> Result<GateDecision, LlmError> {
    let system = "You triage medical-news feed entries. Decide whether the entry points at a \
        scientific or clinical publication (journal article, trial report, guideline) rather \
        than marketing, commentary, or general press. Respond with a JSON object: \
        {\"is_scientific_paper\": true|false, \"reasoning\": \"...\"}.";
    let user = format!("Title: {title}\nDescription: {description}\nURL: {url}");
    call_structured(llm, LlmRequest::new(LlmTask::ScientificGate, system, user, model)).await
}

/// Classified news subtype, keyword-driven and deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsType {
    MetaAnalysis,
    SystematicReview,
    RandomizedControlledTrial,
    CohortStudy,
    CaseReport,
    ClinicalGuideline,
    FdaAnnouncement,
}

impl NewsType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NewsType::MetaAnalysis => "meta_analysis",
            NewsType::SystematicReview => "systematic_review",
            NewsType::RandomizedControlledTrial => "randomized_controlled_trial",
            NewsType::CohortStudy => "cohort_study",
            NewsType::CaseReport => "case_report",
            NewsType::ClinicalGuideline => "clinical_guideline",
            NewsType::FdaAnnouncement => "fda_announcement",
        }
    }
}

impl std::fmt::Display for NewsType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keyword sets per subtype, checked in this order; the first match wins.
const SUBTYPE_KEYWORDS: &[(NewsType, &[&str])] = &[
    (NewsType::MetaAnalysis, &["meta-analysis", "meta analysis", "metaanalysis"]),
    (NewsType::SystematicReview, &["systematic review"]),
    (
        NewsType::RandomizedControlledTrial,
        &["randomized controlled trial", "randomised controlled trial", "rct", "randomized trial", "randomised trial"],
    ),
    (
        NewsType::CohortStudy,
        &["cohort study", "prospective cohort", "retrospective cohort", "observational study"],
    ),
    (NewsType::CaseReport, &["case report", "case series"]),
    (
        NewsType::ClinicalGuideline,
        &["clinical guideline", "practice guideline", "consensus statement", "recommendation statement"],
    ),
    (
        NewsType::FdaAnnouncement,
        &["fda approval", "fda approves", "fda clearance", "fda authorization", "press release"],
    ),
];

/// Case-insensitive substring match against curated keyword sets.
/// Returns the first matching subtype in the fixed priority order.
pub fn classify_news_type(text: &str) -> Option<NewsType> {
    let haystack = text.to_ascii_lowercase();
    for (subtype, keywords) in SUBTYPE_KEYWORDS {
        if keywords.iter().any(|k| contains_keyword(&haystack, k)) {
            return Some(*subtype);
        }
    }
    None
}

/// Substring match, except short all-letter tokens like "rct" which must
/// appear as a whole word to avoid hits inside unrelated words.
fn contains_keyword(haystack: &str, keyword: &str) -> bool {
    if keyword.len() > 4 || keyword.contains(' ') {
        return haystack.contains(keyword);
    }
    haystack
        .split(|c: char| !c.is_ascii_alphanumeric())
        .any(|tok| tok == keyword)
}
