use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::database::records::LuckyNumber;

/// What the next free-text message of a user in a chat answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Idle,
    /// A perfect quiz asked for the quiz ticket.
    AwaitingLuckyNumber,
    AwaitingWhoQuery,
    /// `/add` asked for a ticket earned by an invite.
    AwaitingReferralNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub chat_id: i64,
    pub user_id: i64,
}

impl SessionKey {
    pub fn new(chat_id: i64, user_id: i64) -> Self {
        Self { chat_id, user_id }
    }
}

#[derive(Debug, Default)]
struct Sessions {
    states: HashMap<SessionKey, SessionState>,
    pending: HashMap<SessionKey, LuckyNumber>,
}

/// Process-lifetime session register shared by all handlers.
///
/// The lock is only held inside these methods, never across an `.await`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: Mutex<Sessions>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, Sessions> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: SessionKey) -> SessionState {
        self.sessions()
            .states
            .get(&key)
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&self, key: SessionKey, state: SessionState) {
        let mut sessions = self.sessions();
        if state == SessionState::Idle {
            sessions.states.remove(&key);
        } else {
            sessions.states.insert(key, state);
        }
    }

    pub fn clear(&self, key: SessionKey) {
        self.set(key, SessionState::Idle);
    }

    /// Remembers a number that duplicates one of the user's tickets until
    /// they confirm or drop it.
    pub fn set_pending(&self, key: SessionKey, lucky_number: LuckyNumber) {
        self.sessions().pending.insert(key, lucky_number);
    }

    pub fn take_pending(&self, key: SessionKey) -> Option<LuckyNumber> {
        self.sessions().pending.remove(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_idle_and_clears() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(10, 20);
        assert_eq!(registry.get(key), SessionState::Idle);

        registry.set(key, SessionState::AwaitingWhoQuery);
        assert_eq!(registry.get(key), SessionState::AwaitingWhoQuery);
        assert_eq!(registry.get(SessionKey::new(10, 21)), SessionState::Idle);
        assert_eq!(registry.get(SessionKey::new(11, 20)), SessionState::Idle);

        registry.clear(key);
        assert_eq!(registry.get(key), SessionState::Idle);
    }

    #[test]
    fn pending_number_is_taken_once() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(1, 1);
        registry.set_pending(key, "0420".parse().unwrap());
        assert_eq!(registry.take_pending(key).unwrap().as_str(), "0420");
        assert_eq!(registry.take_pending(key), None);
    }
}
