use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{CompletionConfig, API_KEY_VAR};
use crate::error::ClientError;
use crate::message::SendOutcome;
use crate::render;

/// Longest slice of an error body carried into the transcript.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub top_p: f32,
}

#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<Choice>,
}

/// Something that turns a prompt into a [`SendOutcome`].
///
/// Implementations must not fail: every error is folded into
/// `SendOutcome::Failure`.
#[async_trait]
pub trait Completer: Send + Sync {
    async fn complete(&self, prompt: &str) -> SendOutcome;
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    config: CompletionConfig,
    api_key: Option<String>,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig, api_key: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            config,
            api_key,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Performs one round trip and returns the raw completion text.
    pub async fn try_complete(&self, prompt: &str) -> Result<String, ClientError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ClientError::Configuration(format!(
                "No API key configured. Set {API_KEY_VAR} and restart the application"
            ))
        })?;

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            top_p: self.config.top_p,
        };

        debug!(
            endpoint = %self.config.endpoint,
            model = %self.config.model,
            "sending completion request"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status,
                body: truncate(body.trim(), MAX_ERROR_BODY),
            });
        }

        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ClientError::Protocol(format!("invalid completion payload: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ClientError::Protocol("response contained no completion".to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> ClientError {
        if e.is_timeout() {
            ClientError::Timeout(self.config.timeout)
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Completer for CompletionClient {
    async fn complete(&self, prompt: &str) -> SendOutcome {
        match self.try_complete(prompt).await {
            Ok(content) => SendOutcome::Success {
                rendered_html: render::render_or_plain(&content),
            },
            Err(e) => {
                warn!("completion failed: {e}");
                SendOutcome::Failure {
                    retryable: e.is_retryable(),
                    error_message: e.to_string(),
                }
            }
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> CompletionConfig {
        CompletionConfig {
            endpoint: format!("{}/v1/chat/completions", server.uri()),
            ..CompletionConfig::default()
        }
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                {
                    "index": 0,
                    "message": { "role": "assistant", "content": content },
                    "finish_reason": "stop"
                }
            ]
        })
    }

    fn expect_failure(outcome: SendOutcome) -> (String, bool) {
        match outcome {
            SendOutcome::Failure {
                error_message,
                retryable,
            } => (error_message, retryable),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sends_single_user_turn_with_fixed_sampling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "model": "gpt-4-turbo",
                "messages": [{ "role": "user", "content": "Hello" }],
                "temperature": 1.0,
                "max_tokens": 4095,
                "top_p": 1.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("**Hi!**")))
            .expect(1)
            .mount(&server)
            .await;

        let client = CompletionClient::new(config_for(&server), Some("sk-test".into()));
        let outcome = client.complete("Hello").await;

        match outcome {
            SendOutcome::Success { rendered_html } => {
                assert!(rendered_html.contains("<strong>Hi!</strong>"), "{rendered_html}");
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn try_complete_returns_raw_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(completion_body("| a |\n|---|\n| 1 |")),
            )
            .mount(&server)
            .await;

        let client = CompletionClient::new(config_for(&server), Some("sk-test".into()));
        let content = client.try_complete("table please").await.unwrap();
        assert_eq!(content, "| a |\n|---|\n| 1 |");
    }

    #[tokio::test]
    async fn missing_credential_fails_without_network_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("unused")))
            .expect(0)
            .mount(&server)
            .await;

        let client = CompletionClient::new(config_for(&server), None);
        assert!(!client.has_credential());

        let (message, retryable) = expect_failure(client.complete("Hello").await);
        assert!(message.contains(API_KEY_VAR), "{message}");
        assert!(!retryable);
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn non_success_status_is_retryable_and_names_code() {
        for code in [401u16, 429, 500] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(code).set_body_string("nope"))
                .expect(1)
                .mount(&server)
                .await;

            let client = CompletionClient::new(config_for(&server), Some("sk-test".into()));
            let (message, retryable) = expect_failure(client.complete("Hello").await);
            assert!(message.contains(&code.to_string()), "{message}");
            assert!(retryable, "status {code} should be retryable");
        }
    }

    #[tokio::test]
    async fn malformed_body_is_retryable_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&server)
            .await;

        let client = CompletionClient::new(config_for(&server), Some("sk-test".into()));
        let (message, retryable) = expect_failure(client.complete("Hello").await);
        assert!(message.starts_with("Unexpected response"), "{message}");
        assert!(retryable);
    }

    #[tokio::test]
    async fn empty_choices_is_retryable_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&server)
            .await;

        let client = CompletionClient::new(config_for(&server), Some("sk-test".into()));
        let err = client.try_complete("Hello").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "{err:?}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("late"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let config = CompletionConfig {
            timeout: Duration::from_millis(100),
            ..config_for(&server)
        };
        let client = CompletionClient::new(config, Some("sk-test".into()));
        let err = client.try_complete("Hello").await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout(_)), "{err:?}");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn refused_connection_is_retryable_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = CompletionConfig {
            endpoint: format!("http://127.0.0.1:{port}/v1/chat/completions"),
            ..CompletionConfig::default()
        };
        let client = CompletionClient::new(config, Some("sk-test".into()));
        let (message, retryable) = expect_failure(client.complete("Hello").await);
        assert!(message.starts_with("Failed to send request"), "{message}");
        assert!(retryable);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("short", 10), "short");
    }
}
