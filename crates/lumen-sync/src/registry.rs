//! Subscriber registry.
//!
//! Tracks which consumers want live updates. Registration alone never opens
//! the socket; a consumer has to request updates, which marks it
//! `initialized`. The socket is needed while at least one initialized
//! consumer remains.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Consumer identity. Tokens are never reused within one allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerToken(u64);

impl ConsumerToken {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConsumerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "consumer#{}", self.0)
    }
}

/// Hands out consumer tokens. Clones share the same sequence.
#[derive(Debug, Clone, Default)]
pub struct TokenAllocator(Arc<AtomicU64>);

impl TokenAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_token(&self) -> ConsumerToken {
        ConsumerToken(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Per-consumer state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberState {
    /// Consumer has requested updates (and triggered a connect).
    pub initialized: bool,
}

/// Result of a consumer requesting updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// First request from this consumer: the caller must connect.
    Initialize,
    /// Consumer already requested updates before.
    AlreadyInitialized,
    /// Consumer is not registered.
    Unknown,
}

/// Subscriber registry.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    subscribers: HashMap<ConsumerToken, SubscriberState>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a consumer. Returns `false` if it was already registered.
    pub fn register(&mut self, token: ConsumerToken) -> bool {
        if self.subscribers.contains_key(&token) {
            return false;
        }
        self.subscribers.insert(token, SubscriberState::default());
        debug!(%token, total = self.subscribers.len(), "Subscriber registered");
        true
    }

    /// Consumer asks for live updates.
    pub fn request_updates(&mut self, token: ConsumerToken) -> RequestOutcome {
        match self.subscribers.get_mut(&token) {
            None => RequestOutcome::Unknown,
            Some(state) if state.initialized => RequestOutcome::AlreadyInitialized,
            Some(state) => {
                state.initialized = true;
                RequestOutcome::Initialize
            }
        }
    }

    /// Remove a consumer, returning its last state.
    pub fn remove(&mut self, token: ConsumerToken) -> Option<SubscriberState> {
        let removed = self.subscribers.remove(&token);
        if removed.is_some() {
            debug!(%token, total = self.subscribers.len(), "Subscriber removed");
        }
        removed
    }

    pub fn is_initialized(&self, token: ConsumerToken) -> bool {
        self.subscribers
            .get(&token)
            .is_some_and(|state| state.initialized)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Number of consumers that requested updates.
    pub fn active_count(&self) -> usize {
        self.subscribers.values().filter(|s| s.initialized).count()
    }

    /// Whether anybody still needs the socket.
    pub fn has_active(&self) -> bool {
        self.subscribers.values().any(|s| s.initialized)
    }
}
