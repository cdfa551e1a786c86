//! Per-conversation turn locks.
//!
//! The context store makes each `put` atomic but not a whole turn: two turns
//! for one conversation could both read the same context and the later
//! `put` would drop the earlier turn. Holding a conversation's turn lock from
//! load to commit serializes its turns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use viki_core::ConversationId;

type LockMap = HashMap<ConversationId, Arc<AsyncMutex<()>>>;

/// Turn locks keyed by conversation.
#[derive(Debug, Clone, Default)]
pub struct TurnLocks {
    locks: Arc<Mutex<LockMap>>,
}

impl TurnLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the turn lock of a conversation.
    pub async fn acquire(&self, conversation_id: &ConversationId) -> TurnGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(locks.entry(conversation_id.clone()).or_default())
        };
        let guard = lock.lock_owned().await;
        TurnGuard {
            guard: Some(guard),
            conversation_id: conversation_id.clone(),
            locks: Arc::clone(&self.locks),
        }
    }

    /// Returns the number of conversations with a held or awaited lock.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no lock is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A held turn lock; released on drop.
#[derive(Debug)]
pub struct TurnGuard {
    guard: Option<OwnedMutexGuard<()>>,
    conversation_id: ConversationId,
    locks: Arc<Mutex<LockMap>>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // The table entry is only removed when nobody holds or awaits it; the
        // table lock stops new waiters from cloning it meanwhile.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(&self.conversation_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&self.conversation_id);
        }
    }
}
