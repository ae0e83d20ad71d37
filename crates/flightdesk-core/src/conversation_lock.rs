//! Per-conversation locking so turns of one conversation never interleave.
//!
//! Dialog state is loaded at the start of a turn and written back at the
//! end; two overlapping turns would silently lose one of the writes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type LockMap = Arc<Mutex<HashMap<String, Arc<Semaphore>>>>;

#[derive(Clone)]
pub struct ConversationLockManager {
    locks: LockMap,
    /// Optional global concurrency limit across all conversations
    global_semaphore: Option<Arc<Semaphore>>,
}

impl ConversationLockManager {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            global_semaphore: None,
        }
    }

    pub fn with_global_limit(max_concurrent: usize) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            global_semaphore: Some(Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    /// Waits for exclusive access to a conversation.
    pub async fn acquire(&self, conversation: &str) -> Result<ConversationLockGuard> {
        let global_permit = match &self.global_semaphore {
            Some(sem) => Some(
                sem.clone()
                    .acquire_owned()
                    .await
                    .map_err(|_| anyhow!("global turn limiter closed"))?,
            ),
            None => None,
        };

        let semaphore = self.semaphore_for(conversation)?;
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("conversation lock closed: {conversation}"))?;

        Ok(ConversationLockGuard {
            conversation: conversation.to_string(),
            semaphore,
            locks: self.locks.clone(),
            conversation_permit: Some(permit),
            _global_permit: global_permit,
        })
    }

    /// Number of conversations with a turn running or waiting.
    pub fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    fn semaphore_for(&self, conversation: &str) -> Result<Arc<Semaphore>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| anyhow!("conversation lock map poisoned"))?;
        Ok(locks
            .entry(conversation.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone())
    }
}

impl Default for ConversationLockManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the conversation when dropped, and forgets it once no other
/// turn holds or waits on its semaphore.
pub struct ConversationLockGuard {
    conversation: String,
    semaphore: Arc<Semaphore>,
    locks: LockMap,
    conversation_permit: Option<OwnedSemaphorePermit>,
    _global_permit: Option<OwnedSemaphorePermit>,
}

impl Drop for ConversationLockGuard {
    fn drop(&mut self) {
        // The permit owns a clone of the semaphore; release it before counting.
        self.conversation_permit.take();
        let Ok(mut locks) = self.locks.lock() else {
            return;
        };
        // Waiters clone the semaphore under this same lock, so only the map
        // entry and this guard remain when nobody else needs it.
        if Arc::strong_count(&self.semaphore) == 2 {
            locks.remove(&self.conversation);
        }
    }
}
