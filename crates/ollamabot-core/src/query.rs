use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{build_user_content, ChatBackend},
    domain::ChatId,
    errors::BackendError,
    messaging::{port::MessagingPort, types::ChatAction},
};

/// Spacing of typing indicators while a backend call is outstanding.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// One accepted query, with the model captured when it was dispatched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTask {
    pub chat_id: ChatId,
    pub model: String,
    pub prompt: String,
}

/// Runs backend calls with a typing heartbeat alongside.
#[derive(Clone)]
pub struct QueryExecutor {
    backend: Arc<dyn ChatBackend>,
    messenger: Arc<dyn MessagingPort>,
    heartbeat_interval: Duration,
}

impl QueryExecutor {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        messenger: Arc<dyn MessagingPort>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            backend,
            messenger,
            heartbeat_interval,
        }
    }

    /// Call the backend for `task`.
    ///
    /// The heartbeat emits immediately and then every interval. It is
    /// cancelled and joined before this returns, whatever the outcome.
    pub async fn execute(&self, task: &QueryTask) -> Result<String, BackendError> {
        let cancel = CancellationToken::new();
        let heartbeat = tokio::spawn(heartbeat(
            self.messenger.clone(),
            task.chat_id,
            self.heartbeat_interval,
            Instant::now(),
            cancel.clone(),
        ));

        let content = build_user_content(&task.prompt);
        let result = self.backend.chat(&task.model, &content).await;

        cancel.cancel();
        if let Err(e) = heartbeat.await {
            tracing::warn!(chat_id = task.chat_id.0, "heartbeat task failed: {e}");
        }

        result.map(|answer| answer.trim().to_string())
    }
}

/// Emits at `start`, `start + every`, ... up to and including the instant of
/// cancellation.
async fn heartbeat(
    messenger: Arc<dyn MessagingPort>,
    chat_id: ChatId,
    every: Duration,
    start: Instant,
    cancel: CancellationToken,
) {
    let every = every.max(Duration::from_millis(1));
    let mut due = start;
    loop {
        emit(messenger.as_ref(), chat_id, &cancel).await;

        let now = Instant::now();
        while due <= now {
            due += every;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                // A tick that lands on completion still counts.
                if Instant::now() >= due {
                    emit(messenger.as_ref(), chat_id, &cancel).await;
                }
                break;
            }
            _ = tokio::time::sleep_until(due) => {}
        }
    }
}

/// Start one typing indicator. A send still pending at cancellation is
/// abandoned.
async fn emit(messenger: &dyn MessagingPort, chat_id: ChatId, cancel: &CancellationToken) {
    tokio::select! {
        biased;
        res = messenger.send_chat_action(chat_id, ChatAction::Typing) => {
            if let Err(e) = res {
                tracing::debug!(chat_id = chat_id.0, "typing indicator failed: {e}");
            }
        }
        _ = cancel.cancelled() => {}
    }
}
