use crate::agent::parser::extract_sql;
use crate::config::{normalize_endpoint, AppConfig};
use crate::error::{AskDbError, Result};
use crate::llm::model::Message;
use crate::llm::SqlGenerator;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const CHAT_PATH: &str = "/api/chat";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    format: &'static str,
    options: ChatOptions,
    messages: &'a [Message],
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// chat client for an ollama-compatible `/api/chat` endpoint
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AskDbError::Model(format!("failed to build http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: normalize_endpoint(base_url),
            model: model.into(),
            timeout,
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(&config.model_endpoint, config.model.clone(), config.model_timeout)
    }

    /// sends the conversation and returns the raw `message.content` text
    #[tracing::instrument(skip(self, messages), fields(model = %self.model, message_count = messages.len()))]
    pub async fn chat(&self, messages: &[Message]) -> Result<String> {
        let url = format!("{}{}", self.base_url, CHAT_PATH);
        let body = ChatRequest {
            model: &self.model,
            stream: false,
            format: "json",
            options: ChatOptions { temperature: 0.0 },
            messages,
        };

        let resp = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                AskDbError::Model(format!("model request timed out after {:?}", self.timeout))
            } else {
                AskDbError::Model(format!("failed to reach model endpoint at {}: {}", url, e))
            }
        })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| AskDbError::Model(format!("failed to read model response: {}", e)))?;

        if !status.is_success() {
            return Err(AskDbError::Model(format!(
                "model endpoint returned {}: {}",
                status,
                text.trim()
            )));
        }

        let envelope: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| AskDbError::Model(format!("malformed response envelope: {}", e)))?;

        let content = envelope
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| {
                AskDbError::Model("response envelope has no message.content".to_string())
            })?;

        tracing::debug!(content_len = content.len(), "model responded");
        Ok(content)
    }
}

#[async_trait]
impl SqlGenerator for OllamaClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate_sql(&self, messages: &[Message]) -> Result<String> {
        let content = self.chat(messages).await?;
        extract_sql(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn conversation() -> Vec<Message> {
        vec![
            Message::system("respond with json"),
            Message::user("list active users"),
        ]
    }

    async fn client_for(server: &MockServer) -> OllamaClient {
        OllamaClient::new(&server.uri(), "mistral", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_generate_sql_success() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({
                "model": "mistral",
                "stream": false,
                "format": "json",
                "options": { "temperature": 0.0 },
                "messages": [
                    { "role": "system", "content": "respond with json" },
                    { "role": "user", "content": "list active users" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "mistral",
                "message": {
                    "role": "assistant",
                    "content": "{\"sql\": \"SELECT id FROM public.usuario WHERE ativo = true\"}"
                },
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let sql = client.generate_sql(&conversation()).await.unwrap();
        assert_eq!(sql, "SELECT id FROM public.usuario WHERE ativo = true");
    }

    #[tokio::test]
    async fn test_generate_sql_non_success_status() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(404).set_body_string("model 'mistral' not found"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        match client.generate_sql(&conversation()).await {
            Err(AskDbError::Model(msg)) => assert!(msg.contains("404")),
            other => panic!("expected model error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_sql_malformed_envelope() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "done": true })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client.generate_sql(&conversation()).await;
        assert!(matches!(result, Err(AskDbError::Model(_))));
    }

    #[tokio::test]
    async fn test_generate_sql_rejects_delete() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "message": { "role": "assistant", "content": "{\"sql\": \"DELETE FROM users\"}" }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let result = client.generate_sql(&conversation()).await;
        assert!(matches!(result, Err(AskDbError::Model(_))));
    }

    #[tokio::test]
    async fn test_generate_sql_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "message": { "role": "assistant", "content": "{\"sql\": \"SELECT 1\"}" }
                    }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client =
            OllamaClient::new(&server.uri(), "mistral", Duration::from_millis(200)).unwrap();
        match client.generate_sql(&conversation()).await {
            Err(AskDbError::Model(msg)) => {
                assert_eq!(msg, "model request timed out after 200ms")
            }
            other => panic!("expected model timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_generate_sql_unreachable_endpoint() {
        // nothing listens on port 9 locally
        let client = OllamaClient::new("127.0.0.1:9", "mistral", Duration::from_secs(2)).unwrap();
        let result = client.generate_sql(&conversation()).await;
        assert!(matches!(result, Err(AskDbError::Model(_))));
    }
}
