use std::{fmt::Write as _, sync::Arc, time::Duration};

use chrono::SecondsFormat;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::{
    auth::{AuthGate, Decision, LIST_USERS_LIMIT},
    backend::ChatBackend,
    chunking::{deliver_chunks, split_message, CHUNK_DELAY},
    commands::{classify, ArgError, Command, Route},
    config::Config,
    domain::{ChatId, UserId},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, IncomingMessage, SendOptions},
    },
    query::{QueryExecutor, QueryTask, HEARTBEAT_INTERVAL},
};

const AUTH_ERROR_REPLY: &str = "⚠️ Internal auth error, please try again later.";
const DENIED_REPLY: &str =
    "🚫 You are not allowed to use this bot.\nAsk the admin to add your Telegram ID.";
const EMPTY_ANSWER_REPLY: &str = "⚠️ Backend returned an empty answer.";

#[derive(Clone, Copy, Debug)]
pub struct DispatchSettings {
    /// Maximum chunk length in code points.
    pub chunk_limit: usize,
    pub chunk_delay: Duration,
    pub heartbeat_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            chunk_limit: 4000,
            chunk_delay: CHUNK_DELAY,
            heartbeat_interval: HEARTBEAT_INTERVAL,
        }
    }
}

impl From<&Config> for DispatchSettings {
    fn from(cfg: &Config) -> Self {
        Self {
            chunk_limit: cfg.telegram_safe_limit,
            chunk_delay: cfg.chunk_delay,
            heartbeat_interval: cfg.heartbeat_interval,
        }
    }
}

/// What became of one inbound message.
#[derive(Debug)]
pub enum Handled {
    /// Empty text; nothing was sent.
    Ignored,
    /// A command was answered inline.
    Replied,
    Denied,
    AuthError,
    /// A multi-chunk reply is being delivered in the background.
    ReplySpawned(JoinHandle<()>),
    /// A query task is running in the background.
    QuerySpawned(JoinHandle<()>),
}

/// Sequential consumer of inbound messages.
///
/// Owns `active_model`; query tasks get a copy taken at dispatch time, so a
/// later `/model` switch never reaches a query already in flight.
pub struct Dispatcher {
    gate: AuthGate,
    messenger: Arc<dyn MessagingPort>,
    executor: QueryExecutor,
    settings: DispatchSettings,
    active_model: String,
}

impl Dispatcher {
    pub fn new(
        gate: AuthGate,
        backend: Arc<dyn ChatBackend>,
        messenger: Arc<dyn MessagingPort>,
        initial_model: impl Into<String>,
        settings: DispatchSettings,
    ) -> Self {
        let executor = QueryExecutor::new(backend, messenger.clone(), settings.heartbeat_interval);
        Self {
            gate,
            messenger,
            executor,
            settings,
            active_model: initial_model.into(),
        }
    }

    pub fn active_model(&self) -> &str {
        &self.active_model
    }

    /// Consume `inbox` until every sender is gone.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<IncomingMessage>) {
        while let Some(msg) = inbox.recv().await {
            // Spawned tasks run detached.
            let _handled = self.handle(msg).await;
        }
        tracing::info!("inbox closed, dispatch loop stopped");
    }

    pub async fn handle(&mut self, msg: IncomingMessage) -> Handled {
        let chat_id = msg.chat_id;
        let user_id = msg.user_id;
        let text = msg.text.trim();
        if text.is_empty() {
            return Handled::Ignored;
        }

        let route = classify(text);

        // Admin commands and /whoami run before the allow check.
        match &route {
            Route::Command(cmd) if cmd.is_admin_only() && self.gate.is_admin(user_id) => {
                return match cmd {
                    Command::AddUser(arg) => {
                        self.handle_add_user(chat_id, arg).await;
                        Handled::Replied
                    }
                    _ => self.handle_list_users(chat_id).await,
                };
            }
            Route::Command(Command::WhoAmI) => {
                self.handle_whoami(chat_id, user_id).await;
                return Handled::Replied;
            }
            _ => {}
        }

        match self.gate.decide(user_id).await {
            Ok(Decision::Allow(_)) => {}
            Ok(Decision::Deny) => {
                tracing::info!(user_id = user_id.0, "rejected message from unlisted user");
                self.reply(chat_id, DENIED_REPLY, SendOptions::plain()).await;
                return Handled::Denied;
            }
            Err(e) => {
                tracing::warn!(user_id = user_id.0, "auth error: {e}");
                self.reply(chat_id, AUTH_ERROR_REPLY, SendOptions::plain())
                    .await;
                return Handled::AuthError;
            }
        }

        match route {
            Route::Command(Command::Start) => {
                let greeting = format!(
                    "Hi! Send me any message and I'll forward it to Ollama ({}).\n\n\
                     Code blocks with ``` will be rendered as code in Telegram.",
                    self.active_model
                );
                self.reply(chat_id, &greeting, SendOptions::markdown()).await;
                Handled::Replied
            }
            Route::Command(Command::Model(arg)) => {
                self.handle_model(chat_id, user_id, arg).await;
                Handled::Replied
            }
            // Admin-only commands from anyone else end up here too.
            _ => self.dispatch_query(chat_id, text).await,
        }
    }

    async fn dispatch_query(&self, chat_id: ChatId, prompt: &str) -> Handled {
        if let Err(e) = self
            .messenger
            .send_chat_action(chat_id, ChatAction::Typing)
            .await
        {
            tracing::debug!(chat_id = chat_id.0, "typing indicator failed: {e}");
        }

        let task = QueryTask {
            chat_id,
            model: self.active_model.clone(),
            prompt: prompt.to_string(),
        };
        let executor = self.executor.clone();
        let messenger = self.messenger.clone();
        let settings = self.settings;

        Handled::QuerySpawned(tokio::spawn(run_query(
            executor, messenger, settings, task,
        )))
    }

    async fn handle_model(&mut self, chat_id: ChatId, user_id: UserId, arg: Option<String>) {
        let text = match arg {
            Some(model) => {
                tracing::info!(
                    user_id = user_id.0,
                    from = %self.active_model,
                    to = %model,
                    "active model changed"
                );
                self.active_model = model;
                format!("✅ Model changed to `{}`", self.active_model)
            }
            None => format!(
                "Current model: `{}`\nUsage: `/model llama3.1`",
                self.active_model
            ),
        };
        self.reply(chat_id, &text, SendOptions::markdown()).await;
    }

    async fn handle_add_user(&self, chat_id: ChatId, arg: &Result<UserId, ArgError>) {
        let to_add = match arg {
            Ok(id) => *id,
            Err(ArgError::Missing) => {
                self.reply(chat_id, "Usage: /adduser <telegram_id>", SendOptions::plain())
                    .await;
                return;
            }
            Err(ArgError::NotInteger(_)) => {
                self.reply(
                    chat_id,
                    "Invalid user id (must be integer).",
                    SendOptions::plain(),
                )
                .await;
                return;
            }
        };

        let Some(store) = self.gate.store() else {
            return;
        };

        let text = match store.upsert(to_add).await {
            Ok(()) => {
                tracing::info!(user_id = to_add.0, "user added to whitelist");
                format!("✅ User {to_add} has been added/updated.")
            }
            Err(e) => {
                tracing::warn!(user_id = to_add.0, "adduser error: {e}");
                format!("⚠️ Failed to add user: {e}")
            }
        };
        self.reply(chat_id, &text, SendOptions::plain()).await;
    }

    async fn handle_list_users(&self, chat_id: ChatId) -> Handled {
        let Some(store) = self.gate.store() else {
            return Handled::Replied;
        };

        let text = match store.list(LIST_USERS_LIMIT).await {
            Ok(users) if users.is_empty() => "No users in DB yet.".to_string(),
            Ok(users) => {
                let mut out = String::from("Registered users:\n");
                for u in users {
                    let _ = write!(
                        out,
                        "- ID: {}\n  created_at: {}\n  last_activity: {}\n",
                        u.user_id,
                        u.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                        u.last_activity.to_rfc3339_opts(SecondsFormat::Secs, true),
                    );
                }
                out
            }
            Err(e) => {
                tracing::warn!("listusers error: {e}");
                format!("⚠️ Failed to list users: {e}")
            }
        };

        // A full list can exceed one Telegram message; the paced delivery
        // runs off the loop.
        let chunks = split_message(&text, self.settings.chunk_limit);
        if chunks.len() <= 1 {
            self.reply(chat_id, &text, SendOptions::plain()).await;
            return Handled::Replied;
        }

        let messenger = self.messenger.clone();
        let delay = self.settings.chunk_delay;
        Handled::ReplySpawned(tokio::spawn(async move {
            deliver_chunks(messenger.as_ref(), chat_id, &chunks, SendOptions::plain(), delay).await;
        }))
    }

    async fn handle_whoami(&self, chat_id: ChatId, user_id: UserId) {
        let mut out = String::from("Your info:\n");
        let _ = writeln!(out, "- Telegram ID: {user_id}");

        if self.gate.is_enabled() {
            out.push_str("- Auth: ENABLED\n");
            if self.gate.is_admin(user_id) {
                out.push_str("- Role: admin\n");
            } else {
                out.push_str("- Role: user\n");
            }
            match self.gate.check(user_id).await {
                Ok(d) if d.is_allowed() => out.push_str("- Allowed: YES\n"),
                Ok(_) => out.push_str("- Allowed: NO\n"),
                Err(e) => {
                    let _ = writeln!(out, "- Allowed: ERROR ({e})");
                }
            }
        } else {
            out.push_str("- Auth: DISABLED (bot is open for everyone)\n");
        }

        self.reply(chat_id, &out, SendOptions::plain()).await;
    }

    async fn reply(&self, chat_id: ChatId, text: &str, opts: SendOptions) {
        if let Err(e) = self.messenger.send_text(chat_id, text, opts).await {
            tracing::warn!(chat_id = chat_id.0, "failed to send reply: {e}");
        }
    }
}

async fn run_query(
    executor: QueryExecutor,
    messenger: Arc<dyn MessagingPort>,
    settings: DispatchSettings,
    task: QueryTask,
) {
    let chat_id = task.chat_id;
    match executor.execute(&task).await {
        Ok(answer) if answer.is_empty() => {
            tracing::warn!(chat_id = chat_id.0, model = %task.model, "empty answer from backend");
            if let Err(e) = messenger
                .send_text(chat_id, EMPTY_ANSWER_REPLY, SendOptions::plain())
                .await
            {
                tracing::warn!(chat_id = chat_id.0, "failed to send reply: {e}");
            }
        }
        Ok(answer) => {
            let chunks = split_message(&answer, settings.chunk_limit);
            let delivered = deliver_chunks(
                messenger.as_ref(),
                chat_id,
                &chunks,
                SendOptions::answer(),
                settings.chunk_delay,
            )
            .await;
            tracing::info!(
                chat_id = chat_id.0,
                model = %task.model,
                chunks = chunks.len(),
                delivered,
                "answer delivered"
            );
        }
        Err(e) => {
            tracing::warn!(chat_id = chat_id.0, model = %task.model, "ollama error: {e}");
            let text = format!("⚠️ Error from backend: {e}");
            if let Err(e) = messenger
                .send_text(chat_id, &text, SendOptions::plain())
                .await
            {
                tracing::warn!(chat_id = chat_id.0, "failed to send reply: {e}");
            }
        }
    }
}
