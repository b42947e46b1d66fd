//! Per-user conversation state for multi-step commands.
//!
//! Only the admin broadcast needs more than one message: `/broadcast` moves
//! the sender to [`ConversationState::AwaitingBroadcastText`], their next
//! free-text message is the broadcast body, and `/cancel` or a timeout moves
//! them back to idle. State is keyed by chat and user, so other members of a
//! group chat never consume someone else's pending step.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default time an admin has to type the broadcast text.
pub const DEFAULT_BROADCAST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    Idle,
    AwaitingBroadcastText { since: Instant },
}

/// One user in one chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConversationKey {
    pub chat_id: i64,
    pub user_id: i64,
}

impl ConversationKey {
    pub fn new(chat_id: i64, user_id: i64) -> Self {
        Self { chat_id, user_id }
    }
}

/// Conversation states for all users. Users without an entry are idle.
#[derive(Debug)]
pub struct Conversations {
    states: HashMap<ConversationKey, ConversationState>,
    timeout: Duration,
}

impl Conversations {
    pub fn new(timeout: Duration) -> Self {
        Self {
            states: HashMap::new(),
            timeout,
        }
    }

    /// Current state for a user in a chat, applying the timeout transition.
    pub fn state(&mut self, key: ConversationKey, now: Instant) -> ConversationState {
        match self.states.get(&key).copied() {
            Some(ConversationState::AwaitingBroadcastText { since })
                if now.saturating_duration_since(since) >= self.timeout =>
            {
                self.states.remove(&key);
                ConversationState::Idle
            }
            Some(state) => state,
            None => ConversationState::Idle,
        }
    }

    /// Enter the "awaiting broadcast text" state.
    pub fn begin_broadcast(&mut self, key: ConversationKey, now: Instant) {
        self.states
            .insert(key, ConversationState::AwaitingBroadcastText { since: now });
    }

    /// If the user is awaiting broadcast text, consume that state and return
    /// `true`; the caller then treats the message as the broadcast body.
    pub fn take_broadcast(&mut self, key: ConversationKey, now: Instant) -> bool {
        match self.state(key, now) {
            ConversationState::AwaitingBroadcastText { .. } => {
                self.states.remove(&key);
                true
            }
            ConversationState::Idle => false,
        }
    }

    /// Return the user to idle. Returns `true` if something was cancelled.
    pub fn cancel(&mut self, key: ConversationKey, now: Instant) -> bool {
        let active = !matches!(self.state(key, now), ConversationState::Idle);
        self.states.remove(&key);
        active
    }

    /// Drop every expired conversation and return how many remain active.
    pub fn prune(&mut self, now: Instant) -> usize {
        let timeout = self.timeout;
        self.states.retain(|_, state| match state {
            ConversationState::AwaitingBroadcastText { since } => {
                now.saturating_duration_since(*since) < timeout
            }
            ConversationState::Idle => false,
        });
        self.states.len()
    }
}

impl Default for Conversations {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_TIMEOUT)
    }
}
