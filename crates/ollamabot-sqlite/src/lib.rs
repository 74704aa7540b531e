//! SQLite whitelist store.
//!
//! Schema and timestamp format (RFC 3339, UTC) are stable so existing
//! `bot_users.db` files keep working.

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use ollamabot_core::{
    auth::{UserRecord, UserStore},
    domain::UserId,
    errors::Error,
    Result,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    telegram_id   INTEGER PRIMARY KEY,
    created_at    TEXT NOT NULL,
    last_activity TEXT NOT NULL
);
";

/// Whitelist backed by a single SQLite connection.
///
/// Calls run on the blocking pool; the mutex serializes writes.
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    /// Open (or create) the database at `path`, creating its parent directory.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(map_err)?;
        tracing::info!(path = %path.display(), "opened user store");
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().map_err(map_err)?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA).map_err(map_err)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| Error::Store("connection mutex poisoned".to_string()))?;
            f(&*guard).map_err(map_err)
        })
        .await
        .map_err(|e| Error::Store(format!("store task failed: {e}")))?
    }
}

fn map_err(e: rusqlite::Error) -> Error {
    Error::Store(e.to_string())
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn is_member(&self, user_id: UserId) -> Result<bool> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM users WHERE telegram_id = ?1",
                params![user_id.0],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
        })
        .await
    }

    async fn upsert(&self, user_id: UserId) -> Result<()> {
        let now = now_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO users (telegram_id, created_at, last_activity)
                 VALUES (?1, ?2, ?2)
                 ON CONFLICT(telegram_id) DO UPDATE SET last_activity = excluded.last_activity",
                params![user_id.0, now],
            )
            .map(|_| ())
        })
        .await
    }

    async fn touch(&self, user_id: UserId) -> Result<()> {
        let now = now_rfc3339();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE users SET last_activity = ?1 WHERE telegram_id = ?2",
                params![now, user_id.0],
            )
            .map(|_| ())
        })
        .await
    }

    async fn list(&self, limit: usize) -> Result<Vec<UserRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT telegram_id, created_at, last_activity
                 FROM users
                 ORDER BY created_at ASC, telegram_id ASC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                let created: String = row.get(1)?;
                let last: String = row.get(2)?;
                Ok(UserRecord {
                    user_id: UserId(row.get(0)?),
                    created_at: parse_ts(1, &created)?,
                    last_activity: parse_ts(2, &last)?,
                })
            })?;
            let users = rows.collect::<rusqlite::Result<Vec<_>>>();
            users
        })
        .await
    }
}
