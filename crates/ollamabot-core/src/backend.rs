use async_trait::async_trait;

use crate::errors::BackendError;

/// Formatting instruction appended to every prompt.
pub const MARKDOWN_INSTRUCTION: &str =
    "Please answer in Markdown. Use fenced code blocks (```lang ... ```).";

/// Hexagonal port for the model backend.
///
/// Each call is single-turn and stateless: `content` becomes the only `user`
/// message of the request and no history is carried between calls.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn chat(&self, model: &str, content: &str) -> std::result::Result<String, BackendError>;
}

/// User message content sent to the backend for a raw prompt.
pub fn build_user_content(prompt: &str) -> String {
    format!("{prompt}\n\n{MARKDOWN_INSTRUCTION}")
}
