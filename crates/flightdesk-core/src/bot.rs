//! Top-level turn handling: one inbound activity in, zero or more replies out.

use std::sync::Arc;

use anyhow::Result;
use flightdesk_memory::StateStore;
use flightdesk_schema::{Activity, ActivityKind, ConversationKey, InboundMessage, TurnProperties};
use serde_json::Value;

use crate::context::{BotServices, BotSettings, TurnContext, DIALOG_STACK, ON_TURN};
use crate::conversation_lock::ConversationLockManager;
use crate::dialog::DialogSet;
use crate::error::{DialogError, DialogResult};
use crate::recognizer::Recognizer;
use crate::sink::{RecordSink, TicketReceipt};
use crate::stack::{DialogKind, DialogStack};
use crate::transport::Transport;

pub const APOLOGY: &str = "Oops. Something went wrong!";
const ATTACHMENT_REPLY: &str =
    "Thanks for sending me that attachment. I'm still learning to process attachments.";
const WELCOME: &str = "Welcome to the flight desk! I can help you buy a ticket or look up the tickets you already have.";

/// What happened during one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    pub conversation: ConversationKey,
    pub activities_sent: usize,
    pub submitted: Vec<TicketReceipt>,
    /// Active dialogs after the turn, innermost last.
    pub active_dialogs: Vec<DialogKind>,
    /// Set when the turn failed and the conversation was reset.
    pub recovered_error: Option<String>,
}

pub struct FlightBot {
    services: Arc<BotServices>,
    dialogs: DialogSet,
    locks: ConversationLockManager,
    settings: BotSettings,
}

impl FlightBot {
    pub fn builder() -> FlightBotBuilder {
        FlightBotBuilder::default()
    }

    pub fn settings(&self) -> &BotSettings {
        &self.settings
    }

    /// Runs one turn. Dialog failures are answered with an apology and a
    /// state reset; only failures of that recovery itself are returned.
    pub async fn on_turn(&self, inbound: InboundMessage) -> Result<TurnReport> {
        let key = ConversationKey::from_inbound(&inbound);
        let _guard = self.locks.acquire(key.as_str()).await?;

        tracing::info!(
            conversation = %key,
            trace_id = %inbound.trace_id,
            "turn started"
        );

        let mut tc = TurnContext::new(inbound, self.services.clone());
        let mut stack = DialogStack::new();
        let outcome = self.run_turn(&mut tc, &mut stack).await;

        let recovered_error = match outcome {
            Ok(()) => None,
            Err(err) => {
                tracing::error!(conversation = %key, error = %err, "unhandled turn error");
                if let Err(send_err) = tc.send_text(APOLOGY).await {
                    tracing::warn!(conversation = %key, error = %send_err, "failed to send apology");
                }
                let cleared = tc.clear_state().await?;
                tracing::debug!(conversation = %key, cleared, "conversation state reset");
                stack = DialogStack::new();
                Some(err.to_string())
            }
        };

        Ok(TurnReport {
            conversation: key,
            activities_sent: tc.sent_count(),
            submitted: tc.take_submitted(),
            active_dialogs: stack.kinds(),
            recovered_error,
        })
    }

    async fn run_turn(&self, tc: &mut TurnContext, stack: &mut DialogStack) -> DialogResult<()> {
        match tc.inbound().kind.clone() {
            ActivityKind::Message => self.on_message(tc, stack).await,
            ActivityKind::ConversationUpdate { members_added } => {
                self.welcome(tc, &members_added).await
            }
            ActivityKind::Other => {
                tracing::debug!(conversation = %tc.conversation(), "ignoring non-message activity");
                Ok(())
            }
        }
    }

    async fn on_message(&self, tc: &mut TurnContext, stack: &mut DialogStack) -> DialogResult<()> {
        let on_turn = if let Some(value) = tc.card_value() {
            TurnProperties::from_card_input(value)
        } else if !tc.inbound().attachments.is_empty() {
            tc.send_text(ATTACHMENT_REPLY).await?;
            return Ok(());
        } else if tc.text().trim().is_empty() {
            tracing::debug!(conversation = %tc.conversation(), "empty message ignored");
            return Ok(());
        } else {
            TurnProperties::default()
        };
        ON_TURN.set(tc, &on_turn).await?;

        *stack = DIALOG_STACK.get_or_default(tc).await?;
        match self.dialogs.continue_dialog(tc, stack).await {
            Ok(()) => {}
            Err(DialogError::NoActiveDialog) => {
                self.dialogs
                    .begin_dialog(tc, stack, DialogKind::MainDispatcher, Value::Null)
                    .await?;
            }
            Err(err) => return Err(err),
        }

        if stack.is_idle() {
            DIALOG_STACK.delete(tc).await?;
        } else {
            DIALOG_STACK.set(tc, stack).await?;
        }
        Ok(())
    }

    async fn welcome(&self, tc: &mut TurnContext, members_added: &[String]) -> DialogResult<()> {
        let recipient = tc.inbound().recipient_id.clone();
        let newcomers = members_added
            .iter()
            .filter(|member| Some(member.as_str()) != recipient.as_deref())
            .count();
        for _ in 0..newcomers {
            tc.send(Activity::suggested(
                WELCOME,
                self.settings.suggested_queries.iter().cloned(),
            ))
            .await?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FlightBotBuilder {
    recognizer: Option<Arc<dyn Recognizer>>,
    store: Option<Arc<dyn StateStore>>,
    transport: Option<Arc<dyn Transport>>,
    sink: Option<Arc<dyn RecordSink>>,
    settings: Option<BotSettings>,
    max_concurrent: usize,
}

impl FlightBotBuilder {
    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    pub fn state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn record_sink(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn settings(mut self, settings: BotSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// 0 leaves concurrency across conversations unbounded.
    pub fn max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn build(self) -> Result<FlightBot, DialogError> {
        let services = BotServices {
            recognizer: self
                .recognizer
                .ok_or(DialogError::MissingDependency("recognizer"))?,
            store: self
                .store
                .ok_or(DialogError::MissingDependency("state store"))?,
            transport: self
                .transport
                .ok_or(DialogError::MissingDependency("transport"))?,
            sink: self
                .sink
                .ok_or(DialogError::MissingDependency("record sink"))?,
        };
        let settings = self.settings.unwrap_or_default();
        let locks = if self.max_concurrent == 0 {
            ConversationLockManager::new()
        } else {
            ConversationLockManager::with_global_limit(self.max_concurrent)
        };

        Ok(FlightBot {
            services: Arc::new(services),
            dialogs: DialogSet::new(&settings),
            locks,
            settings,
        })
    }
}
