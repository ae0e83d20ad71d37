//! Drives the dialog stack through one turn.
//!
//! Dialog handlers never call each other. Each returns a [`DialogTurn`] and
//! [`DialogSet`] applies it to the stack, looping until some dialog waits for
//! the user or the stack empties.

use serde::Serialize;
use serde_json::Value;

use crate::admin::AdminDialog;
use crate::context::{BotSettings, TurnContext};
use crate::error::{DialogError, DialogResult};
use crate::interruption::InterruptionDispatcher;
use crate::main_dispatcher::MainDispatcher;
use crate::prompts::{ConfirmPrompt, TextPrompt};
use crate::stack::{DialogFrame, DialogKind, DialogStack};
use crate::ticket::TicketBuyProperty;
use crate::ticket_buy::TicketBuyDialog;
use crate::ticket_fields::TicketBuyFieldsPrompt;
use crate::ticket_list::TicketListDialog;

/// What an interruption dispatcher did with the turn it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionResult {
    /// A reply was sent; the parent should re-prompt.
    Handled,
    /// Not an interruption after all; the parent should process the turn.
    Forwarded,
}

/// Value a dialog ends with, handed to its parent on resume.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum DialogValue {
    #[default]
    None,
    Text(String),
    Confirmed(bool),
    Ticket(TicketBuyProperty),
    Interruption(InterruptionResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DialogTurn {
    Waiting,
    Push { dialog: DialogKind, options: Value },
    End(DialogValue),
    CancelAll,
}

impl DialogTurn {
    pub fn push(dialog: DialogKind, options: &impl Serialize) -> DialogResult<Self> {
        Ok(Self::Push {
            dialog,
            options: serde_json::to_value(options)?,
        })
    }
}

pub struct DialogSet {
    main: MainDispatcher,
    ticket_buy: TicketBuyDialog,
    ticket_fields: TicketBuyFieldsPrompt,
    ticket_list: TicketListDialog,
    admin: AdminDialog,
    text_prompt: TextPrompt,
    confirm_prompt: ConfirmPrompt,
    interruption: InterruptionDispatcher,
}

impl DialogSet {
    pub fn new(settings: &BotSettings) -> Self {
        Self {
            main: MainDispatcher::new(settings.suggested_queries.clone()),
            ticket_buy: TicketBuyDialog::new(settings.rules, settings.suggested_queries.clone()),
            ticket_fields: TicketBuyFieldsPrompt::new(settings.rules),
            ticket_list: TicketListDialog,
            admin: AdminDialog::new(settings.admin_url.clone()),
            text_prompt: TextPrompt,
            confirm_prompt: ConfirmPrompt::new(settings.confirmation.clone()),
            interruption: InterruptionDispatcher,
        }
    }

    /// Clears the stack and starts `dialog` at its first step.
    pub async fn begin_dialog(
        &self,
        tc: &mut TurnContext,
        stack: &mut DialogStack,
        dialog: DialogKind,
        options: Value,
    ) -> DialogResult<()> {
        let frame = stack.begin(dialog);
        let turn = self.begin_frame(tc, frame, options).await?;
        self.drive(tc, stack, turn).await
    }

    /// Hands the turn to the innermost dialog.
    pub async fn continue_dialog(
        &self,
        tc: &mut TurnContext,
        stack: &mut DialogStack,
    ) -> DialogResult<()> {
        let Some(frame) = stack.active_mut() else {
            return Err(DialogError::NoActiveDialog);
        };
        let turn = self.continue_frame(tc, frame).await?;
        self.drive(tc, stack, turn).await
    }

    async fn drive(
        &self,
        tc: &mut TurnContext,
        stack: &mut DialogStack,
        mut turn: DialogTurn,
    ) -> DialogResult<()> {
        loop {
            turn = match turn {
                DialogTurn::Waiting => return Ok(()),
                DialogTurn::CancelAll => {
                    let dropped = stack.cancel_all();
                    tracing::debug!(conversation = %tc.conversation(), dropped, "cancelled all dialogs");
                    return Ok(());
                }
                DialogTurn::Push { dialog, options } => {
                    tracing::debug!(conversation = %tc.conversation(), %dialog, "pushing dialog");
                    let frame = stack.push(dialog);
                    self.begin_frame(tc, frame, options).await?
                }
                DialogTurn::End(value) => {
                    if let Some(ended) = stack.pop() {
                        tracing::debug!(conversation = %tc.conversation(), dialog = %ended.dialog, "dialog ended");
                    }
                    match stack.active_mut() {
                        Some(parent) => self.resume_frame(tc, parent, value).await?,
                        None => return Ok(()),
                    }
                }
            };
        }
    }

    async fn begin_frame(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        options: Value,
    ) -> DialogResult<DialogTurn> {
        match frame.dialog {
            DialogKind::MainDispatcher => self.main.begin(tc).await,
            DialogKind::TicketBuy => self.ticket_buy.begin(tc, frame, options).await,
            DialogKind::TicketBuyFields => self.ticket_fields.begin(tc, frame, options).await,
            DialogKind::TicketList => self.ticket_list.begin(tc, frame, options).await,
            DialogKind::Admin => self.admin.begin(tc).await,
            DialogKind::TextPrompt => self.text_prompt.begin(tc, frame, options).await,
            DialogKind::ConfirmPrompt => self.confirm_prompt.begin(tc, frame, options).await,
            DialogKind::InterruptionDispatcher => self.interruption.begin(tc, options).await,
        }
    }

    async fn continue_frame(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
    ) -> DialogResult<DialogTurn> {
        match frame.dialog {
            DialogKind::MainDispatcher => self.main.begin(tc).await,
            DialogKind::TicketBuy => self.ticket_buy.continue_dialog(tc, frame).await,
            DialogKind::TicketBuyFields => self.ticket_fields.continue_dialog(tc).await,
            DialogKind::TicketList => self.ticket_list.continue_dialog(tc, frame).await,
            DialogKind::Admin => Ok(DialogTurn::End(DialogValue::None)),
            DialogKind::TextPrompt => self.text_prompt.continue_dialog(tc, frame).await,
            DialogKind::ConfirmPrompt => self.confirm_prompt.continue_dialog(tc, frame).await,
            DialogKind::InterruptionDispatcher => self.interruption.continue_dialog(tc).await,
        }
    }

    async fn resume_frame(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        result: DialogValue,
    ) -> DialogResult<DialogTurn> {
        match frame.dialog {
            DialogKind::MainDispatcher => Ok(DialogTurn::End(result)),
            DialogKind::TicketBuy => self.ticket_buy.resume(tc, frame, result).await,
            DialogKind::TicketBuyFields => self.ticket_fields.resume(tc, result).await,
            DialogKind::TicketList => self.ticket_list.resume(tc, frame, result).await,
            DialogKind::TextPrompt => self.text_prompt.resume(tc, frame).await,
            DialogKind::ConfirmPrompt => self.confirm_prompt.resume(tc, frame).await,
            kind @ (DialogKind::Admin | DialogKind::InterruptionDispatcher) => {
                Err(DialogError::InvalidFrameState {
                    dialog: kind,
                    detail: "resumed a dialog that never pushes children".to_string(),
                })
            }
        }
    }
}
