use std::{collections::HashMap, sync::Arc};

use shared::domain::AccountId;
use tokio::sync::Mutex;

/// Per-account position in the broadcast conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingMessage,
}

/// In-memory session map. Accounts without an entry are `Idle`.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<Mutex<HashMap<AccountId, SessionState>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, account_id: AccountId) -> SessionState {
        self.inner
            .lock()
            .await
            .get(&account_id)
            .copied()
            .unwrap_or_default()
    }

    pub async fn set(&self, account_id: AccountId, state: SessionState) {
        let mut guard = self.inner.lock().await;
        match state {
            SessionState::Idle => {
                guard.remove(&account_id);
            }
            other => {
                guard.insert(account_id, other);
            }
        }
    }

    /// Resets the account to `Idle` and returns the state it was in.
    pub async fn take(&self, account_id: AccountId) -> SessionState {
        self.inner
            .lock()
            .await
            .remove(&account_id)
            .unwrap_or_default()
    }
}
