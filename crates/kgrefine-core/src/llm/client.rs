use std::time::Duration;

use rand::Rng;
use reqwest::{Client as HttpClient, StatusCode};
use tracing::{debug, error, warn};

use super::model::{parse_json_content, LanguageModel, LlmError, LlmResult};
use super::types::{ChatRequest, ChatResponse, Message};
use crate::config::LlmConfig;

/// Upper bound for a single backoff sleep (in milliseconds)
const BACKOFF_MAX_MS: u64 = 30_000;

/// Chat-completions client for OpenAI-compatible endpoints (DashScope, OpenAI).
///
/// Timeouts and retries live here and nowhere else in the pipeline.
#[derive(Clone)]
pub struct ChatClient {
    http: HttpClient,
    config: LlmConfig,
    api_key: String,
    url: url::Url,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("url", &self.url.as_str())
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    pub fn new(mut config: LlmConfig) -> LlmResult<Self> {
        let provider = config.provider();
        let api_key = config
            .resolve_api_key()
            .map(str::to_string)
            .ok_or(LlmError::MissingApiKey(provider.api_key_env()))?;

        let base = config.endpoint().trim_end_matches('/').to_string();
        let url = url::Url::parse(&format!("{base}/chat/completions"))?;

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        tracing::info!(provider = %provider, model = %config.model, "Using language model");

        Ok(Self {
            http,
            config,
            api_key,
            url,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn request_for(&self, prompt: &str) -> ChatRequest {
        ChatRequest::new(&self.config.model, vec![Message::user(prompt)])
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.max_tokens)
            .with_json_mode(self.config.json_mode)
    }

    async fn execute(&self, request: &ChatRequest) -> LlmResult<String> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.send(request).await {
                Ok(content) => return Ok(content),
                Err(err) if is_retryable(&err) && attempt <= self.config.max_retries => {
                    let wait = backoff_ms(self.config.retry_backoff_ms, attempt);
                    warn!(attempt, wait_ms = wait, error = %err, "Retrying chat completion");
                    tokio::time::sleep(Duration::from_millis(wait)).await;
                }
                Err(LlmError::Status { status: 429, .. }) => {
                    return Err(LlmError::RateLimited(attempt));
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send(&self, request: &ChatRequest) -> LlmResult<String> {
        let response = self
            .http
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let chat: ChatResponse = response.json().await?;
        chat.content()
            .map(str::to_string)
            .ok_or(LlmError::EmptyResponse)
    }
}

#[async_trait::async_trait]
impl LanguageModel for ChatClient {
    async fn complete_json(&self, task: &str, prompt: &str) -> LlmResult<serde_json::Value> {
        debug!(task, prompt, "LLM request");

        let request = self.request_for(prompt);
        let content = match self.execute(&request).await {
            Ok(content) => content,
            Err(err) => {
                error!(task, error = %err, "LLM call failed");
                return Err(err);
            }
        };

        debug!(task, response = %content, "LLM response");
        parse_json_content(&content)
    }
}

fn is_retryable(err: &LlmError) -> bool {
    match err {
        LlmError::Status { status, .. } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        LlmError::Http(e) => e.is_timeout() || e.is_connect(),
        _ => false,
    }
}

/// Exponential backoff from `base` with up to 25% jitter.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    let exp = base.saturating_mul(1u64 << attempt.saturating_sub(1).min(16));
    let capped = exp.min(BACKOFF_MAX_MS);
    let jitter = rand::rng().random_range(0..=capped / 4);
    capped + jitter
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> LlmConfig {
        LlmConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig {
            model: "no-such-provider-model".into(),
            ..Default::default()
        };
        // Only fails when the environment does not provide a key either.
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(matches!(
                ChatClient::new(config),
                Err(LlmError::MissingApiKey("OPENAI_API_KEY"))
            ));
        }
    }

    #[test]
    fn test_url_joins_chat_completions() {
        let config = LlmConfig {
            base_url: Some("http://localhost:8000/v1/".into()),
            ..config_with_key()
        };
        let client = ChatClient::new(config).unwrap();

        assert_eq!(client.url.as_str(), "http://localhost:8000/v1/chat/completions");
        assert_eq!(client.model(), "qwen-plus");
    }

    #[test]
    fn test_request_uses_config() {
        let config = LlmConfig {
            temperature: 0.2,
            max_tokens: Some(2048),
            ..config_with_key()
        };
        let client = ChatClient::new(config).unwrap();
        let request = client.request_for("文本");

        assert!((request.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, Some(2048));
        assert!(request.response_format.is_some());
        assert_eq!(request.messages[0].content, "文本");
    }

    #[test]
    fn test_retryable_statuses() {
        let status = |s| LlmError::Status {
            status: s,
            body: String::new(),
        };
        assert!(is_retryable(&status(429)));
        assert!(is_retryable(&status(503)));
        assert!(!is_retryable(&status(400)));
        assert!(!is_retryable(&status(401)));
        assert!(!is_retryable(&LlmError::EmptyResponse));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let first = backoff_ms(500, 1);
        assert!((500..=625).contains(&first));

        let third = backoff_ms(500, 3);
        assert!(third >= 2000);

        let huge = backoff_ms(500, 40);
        assert!(huge <= BACKOFF_MAX_MS + BACKOFF_MAX_MS / 4);
    }

    mod http {
        use serde_json::json;
        use wiremock::matchers::{body_partial_json, header, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        use super::*;

        fn client_for(server: &MockServer, max_retries: u32) -> ChatClient {
            ChatClient::new(LlmConfig {
                base_url: Some(server.uri()),
                max_retries,
                retry_backoff_ms: 1,
                ..config_with_key()
            })
            .unwrap()
        }

        fn completion(content: &str) -> ResponseTemplate {
            ResponseTemplate::new(200).set_body_json(json!({
                "model": "qwen-plus",
                "choices": [{"message": {"role": "assistant", "content": content}}]
            }))
        }

        async fn request_count(server: &MockServer) -> usize {
            server.received_requests().await.unwrap().len()
        }

        #[tokio::test]
        async fn test_fenced_content_is_parsed() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .and(header("authorization", "Bearer sk-test"))
                .and(body_partial_json(json!({
                    "model": "qwen-plus",
                    "response_format": {"type": "json_object"},
                    "messages": [{"role": "user", "content": "文本"}]
                })))
                .respond_with(completion("```json\n{\"entities\": []}\n```"))
                .mount(&server)
                .await;

            let value = client_for(&server, 0)
                .complete_json("Candidate Extraction", "文本")
                .await
                .unwrap();

            assert_eq!(value, json!({"entities": []}));
        }

        #[tokio::test]
        async fn test_retries_server_errors_then_succeeds() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(503))
                .up_to_n_times(2)
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .respond_with(completion(r#"{"alias_map": {}}"#))
                .mount(&server)
                .await;

            let value = client_for(&server, 3)
                .complete_json("Context-Aware Entity Linking", "名称")
                .await
                .unwrap();

            assert_eq!(value, json!({"alias_map": {}}));
            assert_eq!(request_count(&server).await, 3);
        }

        #[tokio::test]
        async fn test_rate_limit_exhausts_retries() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(429))
                .mount(&server)
                .await;

            let err = client_for(&server, 2)
                .complete_json("Role Census", "文本")
                .await
                .unwrap_err();

            assert!(matches!(err, LlmError::RateLimited(3)));
            assert_eq!(request_count(&server).await, 3);
        }

        #[tokio::test]
        async fn test_client_error_is_not_retried() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
                .mount(&server)
                .await;

            let err = client_for(&server, 3)
                .complete_json("Schema Optimization", "文本")
                .await
                .unwrap_err();

            assert!(matches!(err, LlmError::Status { status: 400, ref body } if body == "bad request"));
            assert_eq!(request_count(&server).await, 1);
        }

        #[tokio::test]
        async fn test_response_without_choices_is_empty() {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
                .mount(&server)
                .await;

            let err = client_for(&server, 3)
                .complete_json("Refinement & Relabeling", "文本")
                .await
                .unwrap_err();

            assert!(matches!(err, LlmError::EmptyResponse));
            assert_eq!(request_count(&server).await, 1);
        }
    }
}
