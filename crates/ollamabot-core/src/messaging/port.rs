use async_trait::async_trait;

use crate::{
    domain::ChatId,
    messaging::types::{ChatAction, SendOptions},
    Result,
};

/// Outbound side of the chat transport.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str, opts: SendOptions) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}
