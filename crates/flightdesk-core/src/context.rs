//! Everything a dialog can see and touch during one turn.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use flightdesk_memory::{StateScope, StateStore};
use flightdesk_schema::{Activity, ConversationKey, InboundMessage, OutboundMessage, TurnProperties};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::config::{DialogConfig, FlightdeskConfig};
use crate::error::DialogResult;
use crate::prompts::ConfirmationWords;
use crate::recognizer::{Recognizer, RecognizerResult};
use crate::sink::{RecordSink, TicketReceipt};
use crate::stack::DialogStack;
use crate::ticket::{SlotRules, TicketBuyProperty};
use crate::transport::Transport;

/// Tunables the dialogs read at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct BotSettings {
    pub rules: SlotRules,
    pub admin_url: String,
    pub suggested_queries: Vec<String>,
    pub confirmation: ConfirmationWords,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self::from_dialog(&DialogConfig::default(), ConfirmationWords::default())
    }
}

impl BotSettings {
    pub fn from_config(config: &FlightdeskConfig) -> Self {
        Self::from_dialog(
            &config.main.dialog,
            ConfirmationWords::from_config(&config.recognizer),
        )
    }

    fn from_dialog(dialog: &DialogConfig, confirmation: ConfirmationWords) -> Self {
        Self {
            rules: dialog.slot_rules(),
            admin_url: dialog.admin_url.clone(),
            suggested_queries: dialog.suggested_queries.clone(),
            confirmation,
        }
    }
}

/// Collaborators shared by every turn.
pub struct BotServices {
    pub recognizer: Arc<dyn Recognizer>,
    pub store: Arc<dyn StateStore>,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn RecordSink>,
}

pub struct TurnContext {
    conversation: ConversationKey,
    inbound: InboundMessage,
    services: Arc<BotServices>,
    sent: usize,
    submitted: Vec<TicketReceipt>,
}

impl TurnContext {
    pub fn new(inbound: InboundMessage, services: Arc<BotServices>) -> Self {
        Self {
            conversation: ConversationKey::from_inbound(&inbound),
            inbound,
            services,
            sent: 0,
            submitted: Vec::new(),
        }
    }

    pub fn conversation(&self) -> &ConversationKey {
        &self.conversation
    }

    pub fn inbound(&self) -> &InboundMessage {
        &self.inbound
    }

    pub fn text(&self) -> &str {
        &self.inbound.text
    }

    pub fn card_value(&self) -> Option<&Value> {
        self.inbound.value.as_ref()
    }

    /// Whether anything has been sent during this turn.
    pub fn responded(&self) -> bool {
        self.sent > 0
    }

    pub fn sent_count(&self) -> usize {
        self.sent
    }

    pub fn submitted(&self) -> &[TicketReceipt] {
        &self.submitted
    }

    pub(crate) fn take_submitted(&mut self) -> Vec<TicketReceipt> {
        std::mem::take(&mut self.submitted)
    }

    pub async fn send(&mut self, activity: Activity) -> DialogResult<()> {
        let message = OutboundMessage {
            trace_id: self.inbound.trace_id,
            channel_type: self.inbound.channel_type.clone(),
            connector_id: self.inbound.connector_id.clone(),
            conversation_scope: self.inbound.conversation_scope.clone(),
            activity,
            at: Utc::now(),
        };
        self.services
            .transport
            .send_activity(&self.conversation, message)
            .await?;
        self.sent += 1;
        Ok(())
    }

    /// Sends a plain message; empty text is skipped.
    pub async fn send_text(&mut self, text: impl Into<String>) -> DialogResult<()> {
        let text = text.into();
        if text.is_empty() {
            return Ok(());
        }
        self.send(Activity::text(text)).await
    }

    pub async fn recognize(&self) -> DialogResult<RecognizerResult> {
        Ok(self.services.recognizer.recognize(&self.inbound.text).await?)
    }

    pub async fn submit_ticket(&mut self, record: &TicketBuyProperty) -> DialogResult<TicketReceipt> {
        let receipt = self.services.sink.submit(record).await?;
        self.submitted.push(receipt.clone());
        Ok(receipt)
    }

    pub async fn find_tickets(&self, person_name: &str) -> DialogResult<Vec<TicketBuyProperty>> {
        Ok(self.services.sink.find_by_person(person_name).await?)
    }

    /// Forgets every scope of this conversation.
    pub async fn clear_state(&self) -> DialogResult<usize> {
        Ok(self
            .services
            .store
            .clear_conversation(self.conversation.as_str())
            .await?)
    }

    fn store(&self) -> &dyn StateStore {
        self.services.store.as_ref()
    }
}

/// Typed handle to one state scope of the current conversation.
///
/// Reads go to the store every time; writes are immediately durable.
pub struct StateProperty<T> {
    scope: StateScope,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for StateProperty<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StateProperty<T> {}

impl<T> StateProperty<T> {
    pub const fn new(scope: StateScope) -> Self {
        Self {
            scope,
            _marker: PhantomData,
        }
    }

    pub fn scope(&self) -> StateScope {
        self.scope
    }
}

impl<T> StateProperty<T>
where
    T: Serialize + DeserializeOwned,
{
    pub async fn get(&self, tc: &TurnContext) -> DialogResult<Option<T>> {
        let value = tc
            .store()
            .get(tc.conversation().as_str(), self.scope)
            .await?;
        match value {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn get_or_default(&self, tc: &TurnContext) -> DialogResult<T>
    where
        T: Default,
    {
        Ok(self.get(tc).await?.unwrap_or_default())
    }

    pub async fn set(&self, tc: &TurnContext, value: &T) -> DialogResult<()> {
        let value = serde_json::to_value(value)?;
        tc.store()
            .set(tc.conversation().as_str(), self.scope, value)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, tc: &TurnContext) -> DialogResult<bool> {
        Ok(tc
            .store()
            .delete(tc.conversation().as_str(), self.scope)
            .await?)
    }
}

pub const ON_TURN: StateProperty<TurnProperties> = StateProperty::new(StateScope::OnTurn);
pub const DIALOG_STACK: StateProperty<DialogStack> = StateProperty::new(StateScope::DialogStack);
pub const TICKET_BUY: StateProperty<TicketBuyProperty> = StateProperty::new(StateScope::TicketBuy);
