//! In-memory fakes for the ports, shared by the unit tests.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use crate::{
    auth::{UserRecord, UserStore},
    backend::ChatBackend,
    domain::{ChatId, UserId},
    errors::{BackendError, Error},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, SendOptions},
    },
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: ChatId,
        text: String,
        opts: SendOptions,
    },
    Action {
        chat_id: ChatId,
        at: Instant,
    },
}

#[derive(Default)]
pub struct FakeMessenger {
    sent: Mutex<Vec<Sent>>,
    fail_texts: AtomicBool,
}

impl FakeMessenger {
    pub fn fail_texts(&self, on: bool) {
        self.fail_texts.store(on, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text { text, .. } => Some(text),
                Sent::Action { .. } => None,
            })
            .collect()
    }

    pub fn action_times(&self) -> Vec<Instant> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Action { at, .. } => Some(at),
                Sent::Text { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str, opts: SendOptions) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Text {
            chat_id,
            text: text.to_string(),
            opts,
        });
        if self.fail_texts.load(Ordering::SeqCst) {
            return Err(Error::Messaging("send failed".to_string()));
        }
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, _action: ChatAction) -> Result<()> {
        self.sent.lock().unwrap().push(Sent::Action {
            chat_id,
            at: Instant::now(),
        });
        Ok(())
    }
}

/// Whitelist kept in a map. Timestamps come from a counter so that ordering
/// by creation is deterministic.
#[derive(Default)]
pub struct FakeStore {
    users: Mutex<BTreeMap<i64, UserRecord>>,
    clock: AtomicUsize,
    touches: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FakeStore {
    pub fn with_users(ids: &[i64]) -> Self {
        let store = Self::default();
        {
            let mut users = store.users.lock().unwrap();
            for id in ids {
                let at = store.tick();
                users.insert(
                    *id,
                    UserRecord {
                        user_id: UserId(*id),
                        created_at: at,
                        last_activity: at,
                    },
                );
            }
        }
        store
    }

    pub fn fail_reads(&self, on: bool) {
        self.fail_reads.store(on, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    pub fn touch_count(&self) -> usize {
        self.touches.load(Ordering::SeqCst)
    }

    pub fn ids(&self) -> Vec<i64> {
        self.users.lock().unwrap().keys().copied().collect()
    }

    fn tick(&self) -> DateTime<Utc> {
        let n = self.clock.fetch_add(1, Ordering::SeqCst) as i64;
        Utc.timestamp_opt(1_700_000_000 + n, 0)
            .single()
            .unwrap_or_default()
    }

    fn read_guard(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Store("database is locked".to_string()));
        }
        Ok(())
    }

    fn write_guard(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Store("readonly database".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for FakeStore {
    async fn is_member(&self, user_id: UserId) -> Result<bool> {
        self.read_guard()?;
        Ok(self.users.lock().unwrap().contains_key(&user_id.0))
    }

    async fn upsert(&self, user_id: UserId) -> Result<()> {
        self.write_guard()?;
        let at = self.tick();
        let mut users = self.users.lock().unwrap();
        users
            .entry(user_id.0)
            .and_modify(|u| u.last_activity = at)
            .or_insert(UserRecord {
                user_id,
                created_at: at,
                last_activity: at,
            });
        Ok(())
    }

    async fn touch(&self, user_id: UserId) -> Result<()> {
        self.touches.fetch_add(1, Ordering::SeqCst);
        self.write_guard()?;
        let at = self.tick();
        if let Some(u) = self.users.lock().unwrap().get_mut(&user_id.0) {
            u.last_activity = at;
        }
        Ok(())
    }

    async fn list(&self, limit: usize) -> Result<Vec<UserRecord>> {
        self.read_guard()?;
        let mut all: Vec<UserRecord> = self.users.lock().unwrap().values().cloned().collect();
        all.sort_by_key(|u| u.created_at);
        all.truncate(limit);
        Ok(all)
    }
}

/// Backend that answers after a fixed (virtual) delay and records its calls.
pub struct FakeBackend {
    delay: Duration,
    reply: std::result::Result<String, BackendError>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeBackend {
    pub fn answering(reply: &str, delay: Duration) -> Self {
        Self {
            delay,
            reply: Ok(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: BackendError, delay: Duration) -> Self {
        Self {
            delay,
            reply: Err(err),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(model, content)` pairs in call order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn chat(&self, model: &str, content: &str) -> std::result::Result<String, BackendError> {
        self.calls
            .lock()
            .unwrap()
            .push((model.to_string(), content.to_string()));
        tokio::time::sleep(self.delay).await;
        self.reply.clone()
    }
}
