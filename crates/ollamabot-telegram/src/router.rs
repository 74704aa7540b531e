use std::sync::Arc;

use anyhow::Context;
use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::mpsc;

use ollamabot_core::{
    auth::AuthGate,
    backend::ChatBackend,
    config::Config,
    dispatcher::{DispatchSettings, Dispatcher as DispatchLoop},
    domain::{ChatId, UserId},
    messaging::{port::MessagingPort, types::IncomingMessage},
};

use crate::TelegramMessenger;

const INBOX_CAPACITY: usize = 64;

pub async fn run_polling(
    cfg: Arc<Config>,
    gate: AuthGate,
    backend: Arc<dyn ChatBackend>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    let me = bot.get_me().await.context("telegram getMe failed")?;
    tracing::info!(username = %me.username(), "authorized on telegram");

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let dispatch = DispatchLoop::new(
        gate,
        backend,
        messenger,
        cfg.ollama_model.clone(),
        DispatchSettings::from(cfg.as_ref()),
    );

    let (tx, rx) = mpsc::channel::<IncomingMessage>(INBOX_CAPACITY);
    let dispatch_task = tokio::spawn(dispatch.run(rx));

    let handler = Update::filter_message().endpoint(forward_message);

    // One distribution key: updates reach the inbox in arrival order.
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![tx])
        .distribution_function(|_| Some(()))
        .build()
        .dispatch()
        .await;

    dispatch_task.await.context("dispatch loop panicked")?;
    Ok(())
}

async fn forward_message(
    msg: Message,
    inbox: mpsc::Sender<IncomingMessage>,
) -> ResponseResult<()> {
    let Some(incoming) = incoming_from_message(&msg) else {
        return Ok(());
    };
    if inbox.send(incoming).await.is_err() {
        tracing::warn!(chat_id = msg.chat.id.0, "dispatch loop gone, dropping message");
    }
    Ok(())
}

/// Messages without a sender or without text are not handled.
pub fn incoming_from_message(msg: &Message) -> Option<IncomingMessage> {
    let user = msg.from()?;
    let text = msg.text()?;
    Some(IncomingMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: UserId(user.id.0 as i64),
        text: text.to_string(),
    })
}
