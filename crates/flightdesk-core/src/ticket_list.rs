//! Looks up tickets already bought for a passenger.

use async_trait::async_trait;
use flightdesk_schema::entities;
use serde_json::{Map, Value};

use crate::context::{TurnContext, ON_TURN};
use crate::dialog::{DialogTurn, DialogValue};
use crate::error::DialogResult;
use crate::prompts::PromptOptions;
use crate::stack::{DialogFrame, DialogKind};
use crate::waterfall::{
    begin_waterfall, continue_waterfall, resume_waterfall, unknown_step, StepOutcome,
    WaterfallSteps,
};

const STEPS: &[&str] = &["find_person", "list_tickets"];
const ASK_NAME: &str = "Whose tickets should I look up? Tell me the passenger's full name.";

/// Lists previously bought tickets for one passenger.
pub struct TicketListDialog;

impl TicketListDialog {
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

    async fn list(&self, tc: &mut TurnContext, person_name: &str) -> DialogResult<()> {
        let tickets = tc.find_tickets(person_name).await?;
        if tickets.is_empty() {
            return tc
                .send_text(format!("I couldn't find any tickets for {person_name}."))
                .await;
        }

        let mut text = format!("Here are the tickets for {person_name}:");
        for (idx, ticket) in tickets.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", idx + 1, ticket.confirmation_sentence()));
        }
        tc.send_text(text).await
    }
}

#[async_trait]
impl WaterfallSteps for TicketListDialog {
    fn kind(&self) -> DialogKind {
        DialogKind::TicketList
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
            0 => {
                let on_turn = ON_TURN.get_or_default(tc).await?;
                match on_turn.find(entities::PERSON_NAME) {
                    Some(person) => {
                        let name = person.primary().to_string();
                        self.list(tc, &name).await?;
                        Ok(StepOutcome::End(DialogValue::None))
                    }
                    None => StepOutcome::push(
                        DialogKind::TextPrompt,
                        &PromptOptions::new(ASK_NAME),
                    ),
                }
            }
            1 => {
                if let DialogValue::Text(name) = result {
                    self.list(tc, &name).await?;
                }
                Ok(StepOutcome::End(DialogValue::None))
            }
            other => Err(unknown_step(self.kind(), other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::Harness;
    use crate::sink::RecordSink;
    use crate::ticket::{TicketBuyProperty, TicketClass};
    use flightdesk_schema::{EntityValue, TurnProperties};

    #[tokio::test]
    async fn named_person_is_listed_immediately() {
        let harness = Harness::new();
        harness
            .ledger
            .submit(&TicketBuyProperty {
                person_name: "Alice".into(),
                ticket_class: Some(TicketClass::First),
                city_from: "Lyon".into(),
                city_to: "Bath".into(),
                confirmed: Some(true),
                ..TicketBuyProperty::default()
            })
            .await
            .unwrap();

        let tc = harness.turn("");
        ON_TURN
            .set(
                &tc,
                &TurnProperties::new(
                    "TicketList",
                    vec![EntityValue::new(entities::PERSON_NAME, vec!["Alice".into()])],
                ),
            )
            .await
            .unwrap();

        let mut tc = harness.turn("my tickets for Alice");
        let mut frame = DialogFrame::new(DialogKind::TicketList);
        let turn = TicketListDialog
            .begin(&mut tc, &mut frame, Value::Null)
            .await
            .unwrap();

        assert_eq!(turn, DialogTurn::End(DialogValue::None));
        assert_eq!(
            harness.texts(),
            vec!["Here are the tickets for Alice:\n1. First class ticket for Alice from Lyon to Bath."
                .to_string()]
        );
    }

    #[tokio::test]
    async fn asks_for_name_then_lists() {
        let harness = Harness::new();
        let mut tc = harness.turn("my tickets");
        let mut frame = DialogFrame::new(DialogKind::TicketList);

        let turn = TicketListDialog
            .begin(&mut tc, &mut frame, Value::Null)
            .await
            .unwrap();
        assert!(matches!(turn, DialogTurn::Push { dialog: DialogKind::TextPrompt, .. }));

        let mut tc = harness.turn("Bob Stone");
        let turn = TicketListDialog
            .resume(&mut tc, &mut frame, DialogValue::Text("Bob Stone".into()))
            .await
            .unwrap();
        assert_eq!(turn, DialogTurn::End(DialogValue::None));
        assert_eq!(
            harness.texts(),
            vec!["I couldn't find any tickets for Bob Stone.".to_string()]
        );
    }
}
