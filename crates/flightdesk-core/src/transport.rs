use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use flightdesk_schema::{Activity, ConversationKey, OutboundMessage};

/// Delivers bot activities to the user, in the order they are sent.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_activity(
        &self,
        conversation: &ConversationKey,
        message: OutboundMessage,
    ) -> Result<()>;
}

/// Keeps every sent message in memory; used for local runs and tests.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(ConversationKey, OutboundMessage)>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activities(&self, conversation: &ConversationKey) -> Vec<Activity> {
        self.sent
            .lock()
            .map(|sent| {
                sent.iter()
                    .filter(|(key, _)| key == conversation)
                    .map(|(_, msg)| msg.activity.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Removes and returns everything sent so far.
    pub fn drain(&self) -> Vec<OutboundMessage> {
        self.sent
            .lock()
            .map(|mut sent| sent.drain(..).map(|(_, msg)| msg).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_activity(
        &self,
        conversation: &ConversationKey,
        message: OutboundMessage,
    ) -> Result<()> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| anyhow!("recording transport lock poisoned"))?;
        sent.push((conversation.clone(), message));
        Ok(())
    }
}
