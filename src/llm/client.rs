use std::env;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use super::types::{ApiError, ChatRequest, ChatResponse, ErrorBody, Message};

const API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("OPENAI_API_KEY not set. Get one at https://platform.openai.com/api-keys")]
    ApiKeyNotSet,

    #[error("API key rejected: {0}")]
    Unauthorized(String),

    #[error("API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// One single-turn completion.
#[derive(Debug, Clone, Copy)]
pub struct Completion<'a> {
    pub prompt: &'a str,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Abstraction over a chat-completion model.
/// Implemented by `OpenAiClient` for production; mock implementations used in tests.
pub trait ChatModel {
    /// Returns the trimmed reply text.
    async fn complete(&self, completion: Completion<'_>) -> Result<String, LlmError>;
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: Client,
    api_key: ApiKey,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn from_env(http: Client) -> Result<Self, LlmError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| LlmError::ApiKeyNotSet)?;
        if api_key.trim().is_empty() {
            return Err(LlmError::ApiKeyNotSet);
        }
        let model = non_empty_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = non_empty_var("OPENAI_BASE_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| API_BASE.to_string());
        Ok(Self {
            http,
            api_key: ApiKey(api_key.trim().to_string()),
            model,
            base_url,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey("test-key".to_string()),
            model: DEFAULT_MODEL.to_string(),
            base_url: base_url.to_string(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ChatModel for OpenAiClient {
    async fn complete(&self, completion: Completion<'_>) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message::user(completion.prompt)],
            temperature: completion.temperature,
            max_tokens: completion.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key.0)
            .header("User-Agent", crate::USER_AGENT)
            .json(&request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("chat API rate limited");
            return Err(LlmError::RateLimited);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let classified = match serde_json::from_str::<ErrorBody>(&text) {
                Ok(ErrorBody { error: Some(err) }) => classify_api_error(status.as_u16(), &err),
                _ => {
                    let end = text.floor_char_boundary(200);
                    classify_status(status.as_u16(), format!("HTTP {status}: {}", &text[..end]))
                }
            };
            warn!(error = %classified, "chat API error");
            return Err(classified);
        }

        let body: ChatResponse = response.json().await?;
        let text = body.first_text().ok_or(LlmError::EmptyResponse)?;
        debug!(model = %self.model, chars = text.len(), "chat completion done");
        Ok(text.to_string())
    }
}

fn classify_api_error(code: u16, err: &ApiError) -> LlmError {
    let message = match (&err.message, &err.kind) {
        (Some(m), _) => m.clone(),
        (None, Some(kind)) => kind.clone(),
        (None, None) => "Unknown error".to_string(),
    };
    classify_status(code, message)
}

fn classify_status(code: u16, message: String) -> LlmError {
    match code {
        401 => LlmError::Unauthorized(message),
        _ => LlmError::Api { code, message },
    }
}


#[cfg(test)]
mod http_tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(prompt: &str) -> Completion<'_> {
        Completion {
            prompt,
            temperature: 0.5,
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn complete_success_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4",
                "messages": [{"role": "user", "content": "Vraag?"}],
                "temperature": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "  Het antwoord.  "},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        let text = client.complete(completion("Vraag?")).await.unwrap();
        assert_eq!(text, "Het antwoord.");
    }

    #[tokio::test]
    async fn complete_sends_max_tokens_when_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"max_tokens": 2000})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        let req = Completion {
            prompt: "p",
            temperature: 0.3,
            max_tokens: Some(2000),
        };
        assert_eq!(client.complete(req).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn complete_429_returns_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        let result = client.complete(completion("q")).await;
        assert!(matches!(result, Err(LlmError::RateLimited)));
    }

    #[tokio::test]
    async fn complete_401_returns_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        let result = client.complete(completion("q")).await;
        assert!(matches!(result, Err(LlmError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn complete_500_with_error_body_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"message": "The server had an error", "type": "server_error"}
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        match client.complete(completion("q")).await {
            Err(LlmError::Api { code: 500, message }) => {
                assert_eq!(message, "The server had an error");
            }
            other => panic!("expected Api(500) with body message, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_502_with_invalid_body_keeps_snippet() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        match client.complete(completion("q")).await {
            Err(LlmError::Api { code: 502, message }) => {
                assert!(message.contains("bad gateway"), "got: {message}");
            }
            other => panic!("expected Api(502), got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_without_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(Client::new(), &server.uri());
        let result = client.complete(completion("q")).await;
        assert!(matches!(result, Err(LlmError::EmptyResponse)));
    }
}
