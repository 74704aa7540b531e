//! Ollama adapter (non-streaming `/api/chat`).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use ollamabot_core::{backend::ChatBackend, errors::Error, BackendError, Result};

#[derive(Clone, Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
    pub stream: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub message: Option<ResponseMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct OllamaClient {
    chat_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            chat_url: format!("{}/api/chat", base_url.trim_end_matches('/')),
            http,
        })
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    async fn chat(&self, model: &str, content: &str) -> std::result::Result<String, BackendError> {
        let req = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content,
            }],
            stream: false,
        };

        let resp = self
            .http
            .post(&self.chat_url)
            .json(&req)
            .send()
            .await
            .map_err(map_request_error)?;

        let status = resp.status();
        if !status.is_success() {
            let body = match resp.text().await {
                Ok(body) => body,
                Err(e) => {
                    tracing::debug!(status = status.as_u16(), "failed to read error body: {e}");
                    String::new()
                }
            };
            return Err(BackendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.text().await.map_err(map_request_error)?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| BackendError::Decode(e.to_string()))?;

        if let Some(err) = parsed.error.filter(|e| !e.is_empty()) {
            return Err(BackendError::Reported(err));
        }

        let content = parsed.message.map(|m| m.content).unwrap_or_default();
        tracing::debug!(
            model = %parsed.model,
            done = parsed.done,
            chars = content.chars().count(),
            "ollama answered"
        );
        Ok(content.trim().to_string())
    }
}

fn map_request_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}
