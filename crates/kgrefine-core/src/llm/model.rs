use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not set: export {0}")]
    MissingApiKey(&'static str),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Rate limited after {0} attempts")]
    RateLimited(u32),
    #[error("Response had no choices")]
    EmptyResponse,
    #[error("Response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

pub type LlmResult<T> = Result<T, LlmError>;

/// One blocking request/response exchange with a language model. `task` names the
/// stage and is used for logging only.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_json(&self, task: &str, prompt: &str) -> LlmResult<serde_json::Value>;
}

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```(?:json)?\s*(.*?)\s*```\s*$").expect("fence pattern is valid")
});

/// Parses model content as JSON. Empty content is an empty object and a
/// surrounding code fence is stripped.
pub fn parse_json_content(content: &str) -> LlmResult<serde_json::Value> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::Value::Object(serde_json::Map::new()));
    }

    let body = FENCED_JSON
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map_or(trimmed, |m| m.as_str());

    Ok(serde_json::from_str(body)?)
}
