use async_trait::async_trait;
use chrono::Utc;
use flightdesk_schema::Activity;
use serde_json::{Map, Value};

use crate::context::{TurnContext, ON_TURN, TICKET_BUY};
use crate::dialog::{DialogTurn, DialogValue};
use crate::error::{DialogError, DialogResult};
use crate::prompts::PromptOptions;
use crate::stack::{DialogFrame, DialogKind};
use crate::ticket::{SlotRules, TicketBuyProperty};
use crate::waterfall::{
    begin_waterfall, continue_waterfall, resume_waterfall, unknown_step, StepOutcome,
    WaterfallSteps,
};

const STEPS: &[&str] = &["collect_fields", "complete_purchase"];
const ANYTHING_ELSE: &str = "Is there anything else I can help you with?";

/// Purchase flow: gather and confirm the ticket, then submit it once.
pub struct TicketBuyDialog {
    rules: SlotRules,
    suggested_queries: Vec<String>,
}

impl TicketBuyDialog {
    pub fn new(rules: SlotRules, suggested_queries: Vec<String>) -> Self {
        Self {
            rules,
            suggested_queries,
        }
    }

    pub async fn begin(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        options: Value,
    ) -> DialogResult<DialogTurn> {
        begin_waterfall(self, tc, frame, options).await
    }

    pub async fn continue_dialog(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
    ) -> DialogResult<DialogTurn> {
        continue_waterfall(self, tc, frame).await
    }

    pub async fn resume(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        result: DialogValue,
    ) -> DialogResult<DialogTurn> {
        resume_waterfall(self, tc, frame, result).await
    }

    async fn collect_fields(&self, tc: &mut TurnContext) -> DialogResult<StepOutcome> {
        let record = TICKET_BUY.get_or_default(tc).await?;
        let on_turn = ON_TURN.get_or_default(tc).await?;

        let outcome = record.merge_with(&on_turn, &self.rules);
        let mut record = outcome.record.clone();
        record
            .metadata
            .entry("started_at".to_string())
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        TICKET_BUY.set(tc, &record).await?;

        if record.is_complete() && record.is_confirmed() {
            return Ok(StepOutcome::Next(DialogValue::Ticket(record)));
        }

        // A complete record gets its readout from the prompt itself.
        let prompt = if record.is_complete() {
            if let Some(problem) = outcome.first_problem() {
                tc.send_text(problem).await?;
            }
            String::new()
        } else {
            tc.send_text(record.grounded_summary()).await?;
            outcome
                .first_problem()
                .unwrap_or_else(|| record.missing_field_prompt())
                .to_string()
        };

        StepOutcome::push(DialogKind::TicketBuyFields, &PromptOptions::new(prompt))
    }

    async fn complete_purchase(
        &self,
        tc: &mut TurnContext,
        result: DialogValue,
    ) -> DialogResult<StepOutcome> {
        let record = match result {
            DialogValue::Ticket(record) => record,
            _ => TICKET_BUY.get_or_default(tc).await?,
        };
        if !(record.is_complete() && record.is_confirmed()) {
            return Err(DialogError::IncompleteRecord(format!(
                "ticket {} reached submission unconfirmed or incomplete",
                record.id
            )));
        }

        let receipt = tc.submit_ticket(&record).await?;
        tracing::info!(
            conversation = %tc.conversation(),
            ticket_id = %receipt.ticket_id,
            "ticket purchase completed"
        );

        tc.send_text(format!(
            "You have successfully bought a ticket: {}",
            record.confirmation_sentence()
        ))
        .await?;
        tc.send(Activity::suggested(
            ANYTHING_ELSE,
            self.suggested_queries.iter().cloned(),
        ))
        .await?;

        TICKET_BUY.delete(tc).await?;
        Ok(StepOutcome::CancelAll)
    }
}

#[async_trait]
impl WaterfallSteps for TicketBuyDialog {
    fn kind(&self) -> DialogKind {
        DialogKind::TicketBuy
    }

    fn step_names(&self) -> &'static [&'static str] {
        STEPS
    }

    async fn run_step(
        &self,
        index: usize,
        tc: &mut TurnContext,
        _values: &mut Map<String, Value>,
        result: DialogValue,
    ) -> DialogResult<StepOutcome> {
        match index {
            0 => self.collect_fields(tc).await,
            1 => self.complete_purchase(tc, result).await,
            other => Err(unknown_step(self.kind(), other)),
        }
    }
}
