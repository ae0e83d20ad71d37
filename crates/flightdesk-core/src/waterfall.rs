//! Ordered, resumable step sequences.
//!
//! The frame's `step_index` records the step that last ran. Whatever ends a
//! suspension (a child dialog finishing, or the next user turn) resumes at
//! `step_index + 1`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::TurnContext;
use crate::dialog::{DialogTurn, DialogValue};
use crate::error::{DialogError, DialogResult};
use crate::stack::{DialogFrame, DialogKind};

const OPTIONS_KEY: &str = "options";

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Run the next step immediately with this value.
    Next(DialogValue),
    Push { dialog: DialogKind, options: Value },
    /// Stay on top until the user speaks again.
    Wait,
    End(DialogValue),
    CancelAll,
}

impl StepOutcome {
    pub fn push(dialog: DialogKind, options: &impl Serialize) -> DialogResult<Self> {
        Ok(Self::Push {
            dialog,
            options: serde_json::to_value(options)?,
        })
    }
}

#[async_trait]
pub trait WaterfallSteps: Send + Sync {
    fn kind(&self) -> DialogKind;

    fn step_names(&self) -> &'static [&'static str];

    async fn run_step(
        &self,
        index: usize,
        tc: &mut TurnContext,
        values: &mut Map<String, Value>,
        result: DialogValue,
    ) -> DialogResult<StepOutcome>;
}

pub async fn begin_waterfall<W>(
    steps: &W,
    tc: &mut TurnContext,
    frame: &mut DialogFrame,
    options: Value,
) -> DialogResult<DialogTurn>
where
    W: WaterfallSteps + ?Sized,
{
    frame.state.insert(OPTIONS_KEY.to_string(), options);
    run_from(steps, tc, frame, 0, DialogValue::None).await
}

/// The user spoke while the waterfall was waiting.
pub async fn continue_waterfall<W>(
    steps: &W,
    tc: &mut TurnContext,
    frame: &mut DialogFrame,
) -> DialogResult<DialogTurn>
where
    W: WaterfallSteps + ?Sized,
{
    let text = DialogValue::Text(tc.text().to_string());
    let next = frame.step_index + 1;
    run_from(steps, tc, frame, next, text).await
}

/// A child pushed by the current step has ended.
pub async fn resume_waterfall<W>(
    steps: &W,
    tc: &mut TurnContext,
    frame: &mut DialogFrame,
    result: DialogValue,
) -> DialogResult<DialogTurn>
where
    W: WaterfallSteps + ?Sized,
{
    let next = frame.step_index + 1;
    run_from(steps, tc, frame, next, result).await
}

async fn run_from<W>(
    steps: &W,
    tc: &mut TurnContext,
    frame: &mut DialogFrame,
    mut index: usize,
    mut result: DialogValue,
) -> DialogResult<DialogTurn>
where
    W: WaterfallSteps + ?Sized,
{
    let names = steps.step_names();
    loop {
        let Some(name) = names.get(index) else {
            return Ok(DialogTurn::End(result));
        };
        frame.step_index = index;
        tracing::debug!(
            conversation = %tc.conversation(),
            dialog = %steps.kind(),
            step = name,
            index,
            "running waterfall step"
        );

        match steps.run_step(index, tc, &mut frame.state, result).await? {
            StepOutcome::Next(value) => {
                index += 1;
                result = value;
            }
            StepOutcome::Push { dialog, options } => {
                return Ok(DialogTurn::Push { dialog, options })
            }
            StepOutcome::Wait => return Ok(DialogTurn::Waiting),
            StepOutcome::End(value) => return Ok(DialogTurn::End(value)),
            StepOutcome::CancelAll => return Ok(DialogTurn::CancelAll),
        }
    }
}

/// For `run_step` implementations handed an index they do not know.
pub fn unknown_step(kind: DialogKind, index: usize) -> DialogError {
    DialogError::InvalidFrameState {
        dialog: kind,
        detail: format!("no step at index {index}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::Harness;

    /// Greets, waits for a reply, then echoes it back after a skipped step.
    struct Echo;

    #[async_trait]
    impl WaterfallSteps for Echo {
        fn kind(&self) -> DialogKind {
            DialogKind::TicketList
        }

        fn step_names(&self) -> &'static [&'static str] {
            &["greet", "capture", "finish"]
        }

        async fn run_step(
            &self,
            index: usize,
            tc: &mut TurnContext,
            values: &mut Map<String, Value>,
            result: DialogValue,
        ) -> DialogResult<StepOutcome> {
            match index {
                0 => {
                    tc.send_text("say something").await?;
                    Ok(StepOutcome::Wait)
                }
                1 => {
                    if let DialogValue::Text(text) = &result {
                        values.insert("heard".into(), Value::String(text.clone()));
                    }
                    Ok(StepOutcome::Next(result))
                }
                2 => Ok(StepOutcome::End(result)),
                other => Err(unknown_step(self.kind(), other)),
            }
        }
    }

    #[tokio::test]
    async fn waits_then_runs_remaining_steps_on_next_turn() {
        let harness = Harness::new();
        let mut frame = DialogFrame::new(DialogKind::TicketList);

        let mut tc = harness.turn("hi");
        let turn = begin_waterfall(&Echo, &mut tc, &mut frame, Value::Null)
            .await
            .unwrap();
        assert_eq!(turn, DialogTurn::Waiting);
        assert_eq!(frame.step_index, 0);
        assert_eq!(harness.texts(), vec!["say something".to_string()]);

        let mut tc = harness.turn("hello there");
        let turn = continue_waterfall(&Echo, &mut tc, &mut frame).await.unwrap();
        assert_eq!(turn, DialogTurn::End(DialogValue::Text("hello there".into())));
        assert_eq!(frame.step_index, 2);
        assert_eq!(frame.state["heard"], Value::String("hello there".into()));
    }

    #[tokio::test]
    async fn resume_past_last_step_ends_with_result() {
        let harness = Harness::new();
        let mut frame = DialogFrame::new(DialogKind::TicketList);
        frame.step_index = 2;

        let mut tc = harness.turn("");
        let turn = resume_waterfall(&Echo, &mut tc, &mut frame, DialogValue::Confirmed(true))
            .await
            .unwrap();
        assert_eq!(turn, DialogTurn::End(DialogValue::Confirmed(true)));
    }
}
