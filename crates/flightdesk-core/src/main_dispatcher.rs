//! Root dialog: routes a fresh conversation by its recognized intent.

use flightdesk_schema::{Activity, Intent};
use serde_json::Value;

use crate::context::{TurnContext, ON_TURN};
use crate::dialog::{DialogTurn, DialogValue};
use crate::error::DialogResult;
use crate::stack::DialogKind;

const HELP_INTRO: &str = "Let me try to provide some help.";
pub const HELP_BLOCK: &str = "Help - show this info block.\n\
Buy - to start order process.\n\
My tickets - check list of your tickets.\n\
Cancel - cancel current operation.\n\
Admin - administration features.";
const NOTHING_TO_CANCEL: &str = "I don't have anything to cancel.";
const NOT_UNDERSTOOD: &str = "I'm sorry, I didn't quite understand. Here are some things you can ask:";

/// Root dialog: recognizes the opening turn and starts the matching flow.
pub struct MainDispatcher {
    suggested_queries: Vec<String>,
}

impl MainDispatcher {
    pub fn new(suggested_queries: Vec<String>) -> Self {
        Self { suggested_queries }
    }

    pub async fn begin(&self, tc: &mut TurnContext) -> DialogResult<DialogTurn> {
        let mut turn = ON_TURN.get_or_default(tc).await?;

        // Card input may already carry an intent; free text needs recognizing.
        if turn.intent.is_empty() {
            let recognized = tc.recognize().await?;
            turn.intent = recognized.intent.unwrap_or_default();
            turn.entities.extend(recognized.entities);
            ON_TURN.set(tc, &turn).await?;
        }

        let intent = turn.intent();
        tracing::info!(
            conversation = %tc.conversation(),
            intent = intent.as_label(),
            entities = turn.entities.len(),
            "routing turn"
        );

        match intent {
            Intent::TicketBuy => Ok(push(DialogKind::TicketBuy)),
            Intent::TicketList => Ok(push(DialogKind::TicketList)),
            Intent::Admin => Ok(push(DialogKind::Admin)),
            Intent::Help => {
                tc.send_text(HELP_INTRO).await?;
                tc.send_text(HELP_BLOCK).await?;
                Ok(DialogTurn::End(DialogValue::None))
            }
            Intent::Cancel => {
                tc.send_text(NOTHING_TO_CANCEL).await?;
                Ok(DialogTurn::End(DialogValue::None))
            }
            _ => {
                tc.send(Activity::suggested(
                    NOT_UNDERSTOOD,
                    self.suggested_queries.iter().cloned(),
                ))
                .await?;
                Ok(DialogTurn::End(DialogValue::None))
            }
        }
    }
}

fn push(dialog: DialogKind) -> DialogTurn {
    DialogTurn::Push {
        dialog,
        options: Value::Null,
    }
}
