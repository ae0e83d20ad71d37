//! Decides what to do with input that does not fit the slot prompt.

use flightdesk_schema::{Intent, TurnProperties};
use serde_json::Value;

use crate::context::TurnContext;
use crate::dialog::{DialogTurn, DialogValue, InterruptionResult};
use crate::error::DialogResult;

pub const UNAVAILABLE: &str =
    "Sorry. I'm unable to do that right now. You can cancel the current conversation and start a new one";
pub const NOT_RECOGNISED: &str = "Input wasn't recognised... Let's try one more time.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// A global intent that cannot run while a purchase is in progress.
    pub handled: bool,
    pub message: &'static str,
}

fn is_global(intent: &Intent) -> bool {
    matches!(intent, Intent::TicketBuy | Intent::TicketList | Intent::Admin)
}

pub fn dispatch(turn: &TurnProperties) -> DispatchOutcome {
    if is_global(&turn.intent()) {
        DispatchOutcome {
            handled: true,
            message: UNAVAILABLE,
        }
    } else {
        DispatchOutcome {
            handled: false,
            message: NOT_RECOGNISED,
        }
    }
}

pub struct InterruptionDispatcher;

impl InterruptionDispatcher {
    /// `options` carries the turn that triggered the interruption.
    pub async fn begin(&self, tc: &mut TurnContext, options: Value) -> DialogResult<DialogTurn> {
        let turn: TurnProperties = if options.is_null() {
            TurnProperties::default()
        } else {
            serde_json::from_value(options)?
        };

        let outcome = dispatch(&turn);
        tracing::debug!(
            conversation = %tc.conversation(),
            intent = %turn.intent,
            handled = outcome.handled,
            "interruption dispatched"
        );
        tc.send_text(outcome.message).await?;

        if outcome.handled {
            Ok(DialogTurn::End(DialogValue::Interruption(
                InterruptionResult::Handled,
            )))
        } else {
            Ok(DialogTurn::Waiting)
        }
    }

    /// Second chance after "not recognised": global intents are refused again,
    /// anything else goes back to the parent prompt.
    pub async fn continue_dialog(&self, tc: &mut TurnContext) -> DialogResult<DialogTurn> {
        let turn = tc.recognize().await?.into_turn_properties();
        let outcome = dispatch(&turn);
        if outcome.handled {
            tc.send_text(outcome.message).await?;
            return Ok(DialogTurn::End(DialogValue::Interruption(
                InterruptionResult::Handled,
            )));
        }
        Ok(DialogTurn::End(DialogValue::Interruption(
            InterruptionResult::Forwarded,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::Harness;
    use flightdesk_schema::intents;

    #[test]
    fn global_intents_are_handled() {
        for label in [intents::TICKET_BUY, intents::TICKET_LIST, intents::ADMIN] {
            let outcome = dispatch(&TurnProperties::new(label, vec![]));
            assert!(outcome.handled, "{label} should be handled");
            assert_eq!(outcome.message, UNAVAILABLE);
        }
    }

    #[test]
    fn everything_else_is_not_recognised() {
        for label in ["", intents::NONE, intents::INTERRUPTIONS, "Weather"] {
            let outcome = dispatch(&TurnProperties::new(label, vec![]));
            assert!(!outcome.handled);
            assert_eq!(outcome.message, NOT_RECOGNISED);
        }
    }

    #[tokio::test]
    async fn unrecognised_waits_then_forwards() {
        let harness = Harness::new();
        let mut tc = harness.turn("blah");

        let turn = InterruptionDispatcher
            .begin(&mut tc, serde_json::to_value(TurnProperties::default()).unwrap())
            .await
            .unwrap();
        assert_eq!(turn, DialogTurn::Waiting);
        assert_eq!(harness.texts(), vec![NOT_RECOGNISED.to_string()]);

        let mut tc = harness.turn("from Lyon");
        let turn = InterruptionDispatcher.continue_dialog(&mut tc).await.unwrap();
        assert_eq!(
            turn,
            DialogTurn::End(DialogValue::Interruption(InterruptionResult::Forwarded))
        );
        assert!(harness.texts().is_empty());
    }

    #[tokio::test]
    async fn global_intent_on_second_chance_is_refused() {
        let harness = Harness::new();
        let mut tc = harness.turn("show my tickets");
        let turn = InterruptionDispatcher.continue_dialog(&mut tc).await.unwrap();
        assert_eq!(
            turn,
            DialogTurn::End(DialogValue::Interruption(InterruptionResult::Handled))
        );
        assert_eq!(harness.texts(), vec![UNAVAILABLE.to_string()]);
    }
}
