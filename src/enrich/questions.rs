//! Suggested-question generation: exactly three natural-language follow-up
//! questions a reader might ask next. Runs inside a named tracing span.

use serde::Deserialize;
use tracing::Instrument;

use crate::llm::{call_structured, LlmClient, LlmError, LlmRequest, LlmTask};
use crate::model::NewsElements;

#[derive(Debug, Deserialize)]
struct QuestionAnswer {
    #[serde(default)]
    questions: Vec<String>,
}

pub async fn suggest_questions(
    llm: &dyn LlmClient,
    model: &str,
    elements: &NewsElements,
) -> Result<Vec<String>, LlmError> {
    let span = tracing::info_span!("suggest_questions", title = %elements.title);
    async move {
        let system = "You propose follow-up questions a clinician reader would ask after this \
            news summary. Produce exactly three natural-language questions. Respond with a \
            JSON object: {\"questions\": [\"...\", \"...\", \"...\"]}.";
        let user = format!(
            "Title: {}\nKey points: {}\nBody: {}",
            elements.title,
            elements.bullet_points.join("; "),
            elements.paragraphs.join(" ")
        );

        let answer: QuestionAnswer = call_structured(
            llm,
            LlmRequest::new(LlmTask::SuggestedQuestions, system, user, model),
        )
        .await?;

        let questions: Vec<String> = answer
            .questions
            .into_iter()
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .collect();
        if questions.len() < 3 {
            return Err(LlmError::Parse(format!(
                "expected three suggested questions, got {}",
                questions.len()
            )));
        }
        Ok(questions.into_iter().take(3).collect())
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FixedQuestions(Value);

    #[async_trait]
    impl LlmClient for FixedQuestions {
        async fn call_json(&self, _req: LlmRequest) -> Result<Value, LlmError> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn elements() -> NewsElements {
        NewsElements {
            title: "T".to_string(),
            bullet_points: vec![],
            paragraphs: vec![],
        }
    }

    #[tokio::test]
    async fn exactly_three_questions_pass_through() {
        let llm = FixedQuestions(json!({"questions": ["A?", "B?", "C?", "D?"]}));
        let out = suggest_questions(&llm, "m", &elements()).await.unwrap();
        assert_eq!(out, vec!["A?", "B?", "C?"]);
    }

    #[tokio::test]
    async fn fewer_than_three_is_a_parse_failure() {
        let llm = FixedQuestions(json!({"questions": ["A?", "  "]}));
        let err = suggest_questions(&llm, "m", &elements()).await.unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }
}
