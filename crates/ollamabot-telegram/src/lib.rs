//! Telegram adapter (teloxide).
//!
//! Implements the `ollamabot-core` MessagingPort over the Telegram Bot API and
//! feeds inbound messages to the core dispatch loop.

use async_trait::async_trait;

use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};

use tokio::time::sleep;

pub mod router;

use ollamabot_core::{
    domain::ChatId,
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, SendOptions, TextFormat},
    },
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: RequestError) -> Error {
        Error::Messaging(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(
        &self,
        mut op: impl FnMut() -> Fut,
    ) -> std::result::Result<T, RequestError>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(RequestError::RetryAfter(d)) if attempts < MAX_RETRIES => {
                    attempts += 1;
                    sleep(d).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn send_formatted(
        &self,
        chat_id: ChatId,
        text: &str,
        parse_mode: Option<ParseMode>,
        disable_link_preview: bool,
    ) -> std::result::Result<(), RequestError> {
        self.with_retry(|| {
            let req = self
                .bot
                .send_message(Self::tg_chat(chat_id), text.to_string())
                .disable_web_page_preview(disable_link_preview);
            match parse_mode {
                Some(mode) => req.parse_mode(mode),
                None => req,
            }
        })
        .await?;
        Ok(())
    }
}

#[allow(deprecated)]
fn parse_mode_for(format: TextFormat) -> Option<ParseMode> {
    match format {
        TextFormat::Plain => None,
        // Legacy Markdown: model output uses ``` fences and *bold*, which
        // MarkdownV2 would reject without escaping.
        TextFormat::Markdown => Some(ParseMode::Markdown),
    }
}

fn is_entity_error(e: &RequestError) -> bool {
    matches!(e, RequestError::Api(ApiError::CantParseEntities))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str, opts: SendOptions) -> Result<()> {
        let parse_mode = parse_mode_for(opts.format);
        match self
            .send_formatted(chat_id, text, parse_mode, opts.disable_link_preview)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if parse_mode.is_some() && is_entity_error(&e) => {
                tracing::debug!(chat_id = chat_id.0, "markdown rejected, resending as plain text: {e}");
                self.send_formatted(chat_id, text, None, opts.disable_link_preview)
                    .await
                    .map_err(Self::map_err)
            }
            Err(e) => Err(Self::map_err(e)),
        }
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }
}
