use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{domain::UserId, Result};

/// Maximum number of entries `/listusers` asks the store for.
pub const LIST_USERS_LIMIT: usize = 200;

/// One whitelist entry. Timestamps are informational only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// Hexagonal port for the persistent whitelist.
///
/// Implementations serialize their own writes; the gate does no locking.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn is_member(&self, user_id: UserId) -> Result<bool>;

    /// Insert the user, or refresh `last_activity` if already present.
    async fn upsert(&self, user_id: UserId) -> Result<()>;

    /// Refresh `last_activity`. No-op for unknown users.
    async fn touch(&self, user_id: UserId) -> Result<()>;

    /// Up to `limit` users, ordered by `created_at` ascending.
    async fn list(&self, limit: usize) -> Result<Vec<UserRecord>>;
}

/// Why a message was allowed through, or that it was not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow(AllowReason),
    Deny,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllowReason {
    Disabled,
    Admin,
    Listed,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

#[derive(Clone)]
enum Mode {
    Disabled,
    Enabled {
        admin_id: UserId,
        store: Arc<dyn UserStore>,
    },
}

/// Authorization gate over an optional whitelist.
///
/// Every call re-evaluates against the store; nothing is cached.
#[derive(Clone)]
pub struct AuthGate {
    mode: Mode,
}

impl AuthGate {
    /// Everyone is allowed and nobody is admin.
    pub fn disabled() -> Self {
        Self {
            mode: Mode::Disabled,
        }
    }

    pub fn enabled(admin_id: UserId, store: Arc<dyn UserStore>) -> Self {
        Self {
            mode: Mode::Enabled { admin_id, store },
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.mode, Mode::Enabled { .. })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        match &self.mode {
            Mode::Disabled => false,
            Mode::Enabled { admin_id, .. } => *admin_id == user_id,
        }
    }

    /// The whitelist store, when authorization is enabled.
    pub fn store(&self) -> Option<&Arc<dyn UserStore>> {
        match &self.mode {
            Mode::Disabled => None,
            Mode::Enabled { store, .. } => Some(store),
        }
    }

    /// Decision without side effects.
    pub async fn check(&self, user_id: UserId) -> Result<Decision> {
        let (admin_id, store) = match &self.mode {
            Mode::Disabled => return Ok(Decision::Allow(AllowReason::Disabled)),
            Mode::Enabled { admin_id, store } => (*admin_id, store),
        };

        if user_id == admin_id {
            return Ok(Decision::Allow(AllowReason::Admin));
        }

        if store.is_member(user_id).await? {
            Ok(Decision::Allow(AllowReason::Listed))
        } else {
            Ok(Decision::Deny)
        }
    }

    /// Decision for an incoming message.
    ///
    /// Listed users get their activity refreshed (best-effort: a failed touch
    /// is logged and does not change the decision). Store errors are returned
    /// as-is and never touch anything.
    pub async fn decide(&self, user_id: UserId) -> Result<Decision> {
        let decision = self.check(user_id).await?;

        if decision == Decision::Allow(AllowReason::Listed) {
            if let Some(store) = self.store() {
                if let Err(e) = store.touch(user_id).await {
                    tracing::warn!(user_id = user_id.0, "failed to update last_activity: {e}");
                }
            }
        }

        Ok(decision)
    }
}
