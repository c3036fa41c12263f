//! LLM structured-call collaborator: provider abstraction over "prompt +
//! expected JSON shape -> parsed value", with tagged errors so the pipeline
//! can route connection vs. rate-limit vs. validation failures without
//! string matching.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ErrorCategory;

/// Which pipeline stage a call belongs to. Used for per-task metrics and
/// lets test doubles dispatch without sniffing prompt text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmTask {
    ScientificGate,
    SufficiencyCheck,
    UrlExtraction,
    AnswerSynthesis,
    SpecialtyDetection,
    InterestTagging,
    Scoring,
    SuggestedQuestions,
}

impl LlmTask {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmTask::ScientificGate => "scientific_gate",
            LlmTask::SufficiencyCheck => "sufficiency_check",
            LlmTask::UrlExtraction => "url_extraction",
            LlmTask::AnswerSynthesis => "answer_synthesis",
            LlmTask::SpecialtyDetection => "specialty_detection",
            LlmTask::InterestTagging => "interest_tagging",
            LlmTask::Scoring => "scoring",
            LlmTask::SuggestedQuestions => "suggested_questions",
        }
    }
}

/// One structured call. The system prompt must instruct the model to answer
/// with a single JSON object; `call_json` returns it parsed.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub task: LlmTask,
    pub system: String,
    pub user: String,
    pub model: String,
    pub temperature: f32,
    /// Allow the provider to use web-search augmentation where supported.
    pub web_search: bool,
}

impl LlmRequest {
    pub fn new(task: LlmTask, system: impl Into<String>, user: impl Into<String>, model: &str) -> Self {
        Self {
            task,
            system: system.into(),
            user: user.into(),
            model: model.to_string(),
            temperature: 0.2,
            web_search: false,
        }
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm rate limited: {0}")]
    RateLimited(String),
    #[error("llm connection failed: {0}")]
    Connection(String),
    #[error("llm api error (status {status}): {body}")]
    Api { status: u16, body: String },
    #[error("llm output parse failed: {0}")]
    Parse(String),
}

impl LlmError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            LlmError::RateLimited(_) => ErrorCategory::RateLimit,
            LlmError::Connection(_) => ErrorCategory::ApiConnection,
            LlmError::Api { .. } => ErrorCategory::ApiConnection,
            LlmError::Parse(_) => ErrorCategory::Validation,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn call_json(&self, req: LlmRequest) -> Result<Value, LlmError>;
    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Call and deserialize into the stage's output struct.
pub async fn call_structured<T: DeserializeOwned>(
    client: &dyn LlmClient,
    req: LlmRequest,
) -> Result<T, LlmError> {
    let value = client.call_json(req).await?;
    serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))
}

/// Chat-completions request payload. When the request allows web search,
/// `web_search_options` is included so search-enabled chat models augment
/// the answer; models without search ignore it.
fn request_body(req: &LlmRequest) -> Value {
    let mut body = serde_json::json!({
        "model": req.model,
        "messages": [
            { "role": "system", "content": req.system },
            { "role": "user", "content": req.user },
        ],
        "temperature": req.temperature,
        "response_format": { "type": "json_object" },
    });
    if req.web_search {
        body["web_search_options"] = serde_json::json!({});
    }
    body
}

/// OpenAI chat-completions provider with JSON response format.
/// Requires `OPENAI_API_KEY`.
pub struct OpenAiLlm {
    http: reqwest::Client,
    api_key: String,
}

impl OpenAiLlm {
    pub fn new(api_key: String) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("mednews-pipeline/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self { http, api_key }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("OPENAI_API_KEY").unwrap_or_default())
    }
}

#[async_trait]
impl LlmClient for OpenAiLlm {
    async fn call_json(&self, req: LlmRequest) -> Result<Value, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::Api {
                status: 401,
                body: "OPENAI_API_KEY not set".to_string(),
            });
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&request_body(&req))
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::RateLimited(body));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or("");

        metrics::counter!("llm_calls_total", "task" => req.task.as_str()).increment(1);

        serde_json::from_str(content).map_err(|e| LlmError::Parse(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
