//! Answer synthesis: topic + source text -> `{title, bullet_points,
//! paragraphs}`. Web-search augmentation is permitted for this stage.

use crate::llm::{call_structured, LlmClient, LlmError, LlmRequest, LlmTask};
use crate::model::NewsElements;

pub async fn synthesize_answer(
    llm: &dyn LlmClient,
    model: &str,
    topic: &str,
    source_text: &str,
) -> Result<NewsElements, LlmError> {
    let system = "You write concise clinical-news summaries for physicians. From the topic and \
        source text, produce a JSON object: {\"title\": \"...\", \"bullet_points\": [\"...\"], \
        \"paragraphs\": [\"...\"]}. The title is one plain sentence; bullet points are the key \
        findings; paragraphs give context, methods, and clinical implications.";
    let excerpt: String = source_text.chars().take(12_000).collect();
    let user = format!("Topic: {topic}\n\nSource text:\n{excerpt}");

    let elements: NewsElements = call_structured(
        llm,
        LlmRequest::new(LlmTask::AnswerSynthesis, system, user, model).with_web_search(),
    )
    .await?;

    if elements.title.trim().is_empty() {
        return Err(LlmError::Parse("synthesized answer has an empty title".into()));
    }
    Ok(elements)
}
