//! The persisted dialog stack of one conversation.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogKind {
    MainDispatcher,
    TicketBuy,
    TicketBuyFields,
    TicketList,
    Admin,
    TextPrompt,
    ConfirmPrompt,
    InterruptionDispatcher,
}

impl DialogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MainDispatcher => "main_dispatcher",
            Self::TicketBuy => "ticket_buy",
            Self::TicketBuyFields => "ticket_buy_fields",
            Self::TicketList => "ticket_list",
            Self::Admin => "admin",
            Self::TextPrompt => "text_prompt",
            Self::ConfirmPrompt => "confirm_prompt",
            Self::InterruptionDispatcher => "interruption_dispatcher",
        }
    }
}

impl fmt::Display for DialogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogFrame {
    pub dialog: DialogKind,
    #[serde(default)]
    pub step_index: usize,
    /// Dialog-local values, e.g. prompt options or waterfall results.
    #[serde(default)]
    pub state: Map<String, Value>,
}

impl DialogFrame {
    pub fn new(dialog: DialogKind) -> Self {
        Self {
            dialog,
            step_index: 0,
            state: Map::new(),
        }
    }
}

/// Innermost frame last. An empty stack means the conversation is idle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DialogStack {
    frames: Vec<DialogFrame>,
}

impl DialogStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[DialogFrame] {
        &self.frames
    }

    pub fn active(&self) -> Option<&DialogFrame> {
        self.frames.last()
    }

    pub fn active_mut(&mut self) -> Option<&mut DialogFrame> {
        self.frames.last_mut()
    }

    pub fn kinds(&self) -> Vec<DialogKind> {
        self.frames.iter().map(|f| f.dialog).collect()
    }

    /// Replaces whatever is on the stack with a single fresh frame.
    pub fn begin(&mut self, dialog: DialogKind) -> &mut DialogFrame {
        self.frames.clear();
        self.push(dialog)
    }

    pub fn push(&mut self, dialog: DialogKind) -> &mut DialogFrame {
        self.frames.push(DialogFrame::new(dialog));
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn pop(&mut self) -> Option<DialogFrame> {
        self.frames.pop()
    }

    /// Returns how many frames were discarded.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_pop_follows_lifo() {
        let mut stack = DialogStack::new();
        assert!(stack.is_idle());

        stack.begin(DialogKind::MainDispatcher);
        stack.push(DialogKind::TicketBuy);
        stack.push(DialogKind::TicketBuyFields);
        assert_eq!(stack.depth(), 3);
        assert_eq!(stack.active().map(|f| f.dialog), Some(DialogKind::TicketBuyFields));

        let popped = stack.pop().unwrap();
        assert_eq!(popped.dialog, DialogKind::TicketBuyFields);
        assert_eq!(stack.active().map(|f| f.dialog), Some(DialogKind::TicketBuy));
    }

    #[test]
    fn begin_clears_previous_frames() {
        let mut stack = DialogStack::new();
        stack.begin(DialogKind::TicketList);
        stack.push(DialogKind::TextPrompt);

        stack.begin(DialogKind::MainDispatcher);
        assert_eq!(stack.kinds(), vec![DialogKind::MainDispatcher]);
    }

    #[test]
    fn cancel_all_empties_stack() {
        let mut stack = DialogStack::new();
        stack.begin(DialogKind::MainDispatcher);
        stack.push(DialogKind::TicketBuy);
        assert_eq!(stack.cancel_all(), 2);
        assert!(stack.is_idle());
        assert!(stack.pop().is_none());
    }

    #[test]
    fn serializes_as_plain_frame_list() {
        let mut stack = DialogStack::new();
        let frame = stack.begin(DialogKind::TicketBuy);
        frame.step_index = 1;
        frame.state.insert("options".into(), json!(null));

        let value = serde_json::to_value(&stack).unwrap();
        assert_eq!(
            value,
            json!([{"dialog": "ticket_buy", "step_index": 1, "state": {"options": null}}])
        );

        let restored: DialogStack = serde_json::from_value(value).unwrap();
        assert_eq!(restored, stack);
    }
}
