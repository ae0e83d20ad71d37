//! Per-conversation state storage.
//!
//! Each conversation owns a handful of JSON blobs, one per [`StateScope`].
//! Stores only promise read-your-writes per conversation key; callers are
//! expected to serialize turns of the same conversation.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateScope {
    /// Intent and entities recognized for the turn in flight.
    OnTurn,
    /// The persisted dialog stack.
    DialogStack,
    /// The ticket purchase being filled.
    TicketBuy,
}

impl StateScope {
    pub const ALL: [StateScope; 3] = [Self::OnTurn, Self::DialogStack, Self::TicketBuy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTurn => "on_turn",
            Self::DialogStack => "dialog_stack",
            Self::TicketBuy => "ticket_buy",
        }
    }
}

impl fmt::Display for StateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, conversation: &str, scope: StateScope) -> Result<Option<Value>>;
    async fn set(&self, conversation: &str, scope: StateScope, value: Value) -> Result<()>;
    /// Returns whether a value was present.
    async fn delete(&self, conversation: &str, scope: StateScope) -> Result<bool>;
    /// Drops every scope of one conversation, returning how many were removed.
    async fn clear_conversation(&self, conversation: &str) -> Result<usize>;
}

#[derive(Default)]
pub struct InMemoryStateStore {
    entries: RwLock<HashMap<(String, StateScope), Value>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, conversation: &str, scope: StateScope) -> Result<Option<Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(&(conversation.to_string(), scope)).cloned())
    }

    async fn set(&self, conversation: &str, scope: StateScope, value: Value) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert((conversation.to_string(), scope), value);
        Ok(())
    }

    async fn delete(&self, conversation: &str, scope: StateScope) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(&(conversation.to_string(), scope)).is_some())
    }

    async fn clear_conversation(&self, conversation: &str) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|(key, _), _| key != conversation);
        Ok(before - entries.len())
    }
}
