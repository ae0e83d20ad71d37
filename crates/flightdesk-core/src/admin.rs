//! Admin console entry point.

use flightdesk_schema::Activity;
use serde_json::{json, Value};

use crate::context::TurnContext;
use crate::dialog::{DialogTurn, DialogValue};
use crate::error::DialogResult;

const NOT_CONFIGURED: &str = "The admin console is not configured.";

/// Hands out a login card for the admin console.
pub struct AdminDialog {
    admin_url: String,
}

impl AdminDialog {
    pub fn new(admin_url: String) -> Self {
        Self { admin_url }
    }

    pub fn login_card(&self) -> Value {
        json!({
            "type": "AdaptiveCard",
            "version": "1.0",
            "body": [
                { "type": "TextBlock", "text": "Admin login", "weight": "bolder" }
            ],
            "actions": [
                { "type": "Action.OpenUrl", "title": "Open admin console", "url": self.admin_url }
            ]
        })
    }

    pub async fn begin(&self, tc: &mut TurnContext) -> DialogResult<DialogTurn> {
        if self.admin_url.is_empty() {
            tc.send_text(NOT_CONFIGURED).await?;
        } else {
            tc.send(Activity::Card {
                card: self.login_card(),
            })
            .await?;
        }
        Ok(DialogTurn::End(DialogValue::None))
    }
}
