use crate::domain::{ChatId, UserId};

/// One inbound text message, already stripped of transport details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub text: String,
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Rich-text rendering mode of an outgoing message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextFormat {
    Plain,
    Markdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SendOptions {
    pub format: TextFormat,
    pub disable_link_preview: bool,
}

impl SendOptions {
    pub fn plain() -> Self {
        Self {
            format: TextFormat::Plain,
            disable_link_preview: false,
        }
    }

    pub fn markdown() -> Self {
        Self {
            format: TextFormat::Markdown,
            disable_link_preview: false,
        }
    }

    /// Model answers: Markdown, no link previews.
    pub fn answer() -> Self {
        Self {
            format: TextFormat::Markdown,
            disable_link_preview: true,
        }
    }
}
