//! Collects the ticket fields turn by turn and asks for confirmation.
//!
//! On each user turn the prompt merges entities carried by the parent turn,
//! then its own recognizer result, then reacts to the recognized intent. Any
//! rejected candidate stops the turn with the first problem message.

use flightdesk_schema::{Activity, Intent, TurnProperties};
use serde_json::Value;

use crate::context::{TurnContext, ON_TURN, TICKET_BUY};
use crate::dialog::{DialogTurn, DialogValue, InterruptionResult};
use crate::error::DialogResult;
use crate::prompts::PromptOptions;
use crate::stack::{DialogFrame, DialogKind};
use crate::ticket::{SlotRules, TicketBuyProperty, UpdateOutcome};

pub const CONFIRM_CANCEL_PROMPT: &str = "Are you sure you want to cancel?";
const CANCELLED: &str = "Sure. I've cancelled that!";
const WHAT_TO_CHANGE: &str = "What would you like to change?";
const CHANGE_HINT: &str =
    "You can say things like 'from New York to Dublin' or 'First class', or tell me there are no changes.";
const READOUT_PREFIX: &str = "So, here is what I got from you: ";
const GO_AHEAD: &str = "Should I go ahead with this buy?";

pub struct TicketBuyFieldsPrompt {
    rules: SlotRules,
}

impl TicketBuyFieldsPrompt {
    pub fn new(rules: SlotRules) -> Self {
        Self { rules }
    }

    pub async fn begin(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        options: Value,
    ) -> DialogResult<DialogTurn> {
        let options = PromptOptions::parse(options)?;
        options.save(frame)?;

        if !options.prompt.is_empty() {
            tc.send_text(options.prompt).await?;
            return Ok(DialogTurn::Waiting);
        }

        let record = TICKET_BUY.get_or_default(tc).await?;
        self.activate(tc, record).await
    }

    pub async fn continue_dialog(&self, tc: &mut TurnContext) -> DialogResult<DialogTurn> {
        let mut record = TICKET_BUY.get_or_default(tc).await?;
        let on_turn = ON_TURN.get_or_default(tc).await?;

        let carried = record.merge_with(&on_turn, &self.rules);
        if carried.has_problems() {
            return self.reject(tc, carried).await;
        }
        record = carried.record;

        let recognized = tc.recognize().await?;
        let intent = match recognized.intent.as_deref() {
            Some(label) if !label.is_empty() => Intent::from_label(label),
            _ => on_turn.intent(),
        };
        let recognized = TurnProperties::new(intent.as_label(), recognized.entities);

        let merged = record.merge_with(&recognized, &self.rules);
        if merged.has_problems() {
            return self.reject(tc, merged).await;
        }
        record = merged.record;

        tracing::debug!(
            conversation = %tc.conversation(),
            intent = intent.as_label(),
            "ticket prompt handling turn"
        );

        match intent {
            Intent::ContinuePrompt | Intent::NoChange => record.needs_change = None,
            Intent::Help => tc.send_text(record.contextual_help()).await?,
            Intent::Cancel => {
                TICKET_BUY.set(tc, &record).await?;
                return DialogTurn::push(
                    DialogKind::ConfirmPrompt,
                    &PromptOptions::new(CONFIRM_CANCEL_PROMPT),
                );
            }
            _ => {
                let captured = on_turn.has_entities() || recognized.has_entities();
                if !captured {
                    TICKET_BUY.set(tc, &record).await?;
                    return DialogTurn::push(DialogKind::InterruptionDispatcher, &recognized);
                }
            }
        }

        TICKET_BUY.set(tc, &record).await?;
        self.activate(tc, record).await
    }

    pub async fn resume(
        &self,
        tc: &mut TurnContext,
        result: DialogValue,
    ) -> DialogResult<DialogTurn> {
        match result {
            DialogValue::Confirmed(true) => {
                tc.send_text(CANCELLED).await?;
                TICKET_BUY.delete(tc).await?;
                Ok(DialogTurn::CancelAll)
            }
            DialogValue::Interruption(InterruptionResult::Forwarded) => {
                self.continue_dialog(tc).await
            }
            _ => {
                let record = TICKET_BUY.get_or_default(tc).await?;
                self.reprompt(tc, &record).await?;
                Ok(DialogTurn::Waiting)
            }
        }
    }

    /// Ends the prompt once the ticket is complete and confirmed; otherwise
    /// asks for whatever is still needed.
    async fn activate(
        &self,
        tc: &mut TurnContext,
        record: TicketBuyProperty,
    ) -> DialogResult<DialogTurn> {
        if record.is_complete() && record.is_confirmed() {
            return Ok(DialogTurn::End(DialogValue::Ticket(record)));
        }

        if record.is_complete() {
            if record.wants_change() {
                tc.send_text(WHAT_TO_CHANGE).await?;
                tc.send(Activity::suggested(CHANGE_HINT, ["No changes"]))
                    .await?;
            } else {
                self.send_readout(tc, &record).await?;
            }
        } else {
            tc.send_text(record.grounded_summary()).await?;
            tc.send_text(record.missing_field_prompt()).await?;
        }
        Ok(DialogTurn::Waiting)
    }

    async fn reprompt(&self, tc: &mut TurnContext, record: &TicketBuyProperty) -> DialogResult<()> {
        if record.is_complete() {
            self.send_readout(tc, record).await
        } else {
            tc.send_text(record.missing_field_prompt()).await
        }
    }

    async fn send_readout(&self, tc: &mut TurnContext, record: &TicketBuyProperty) -> DialogResult<()> {
        tc.send_text(format!("{READOUT_PREFIX}{}", record.confirmation_sentence()))
            .await?;
        tc.send(Activity::suggested(GO_AHEAD, ["Yes", "Edit", "Cancel"]))
            .await
    }

    async fn reject(&self, tc: &mut TurnContext, outcome: UpdateOutcome) -> DialogResult<DialogTurn> {
        tracing::warn!(
            conversation = %tc.conversation(),
            problems = outcome.problems.len(),
            "rejected ticket input"
        );
        TICKET_BUY.set(tc, &outcome.record).await?;
        if let Some(problem) = outcome.first_problem() {
            tc.send_text(problem).await?;
        }
        Ok(DialogTurn::Waiting)
    }
}
