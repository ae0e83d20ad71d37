//! Generic single-question prompts.

use flightdesk_schema::{entities, Activity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::RecognizerConfig;
use crate::context::TurnContext;
use crate::dialog::{DialogTurn, DialogValue};
use crate::error::DialogResult;
use crate::stack::DialogFrame;

const OPTIONS_KEY: &str = "options";
const DEFAULT_CONFIRM_RETRY: &str = "Please answer yes or no.";
const CANCELLED: &str = "Ok. I've cancelled our last activity.";

const YES_WORDS: &[&str] = &[
    "yes", "y", "yep", "yeah", "sure", "ok", "okay", "of course", "yes please", "true",
];
const NO_WORDS: &[&str] = &["no", "n", "nope", "nah", "no thanks", "not now", "false"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptOptions {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub retry_prompt: Option<String>,
    /// Rendered as suggested actions under the prompt.
    #[serde(default)]
    pub choices: Vec<String>,
}

impl PromptOptions {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_retry(mut self, retry: impl Into<String>) -> Self {
        self.retry_prompt = Some(retry.into());
        self
    }

    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub(crate) fn parse(options: Value) -> DialogResult<Self> {
        if options.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(options)?)
    }

    pub(crate) fn save(&self, frame: &mut DialogFrame) -> DialogResult<()> {
        frame
            .state
            .insert(OPTIONS_KEY.to_string(), serde_json::to_value(self)?);
        Ok(())
    }

    pub(crate) fn load(frame: &DialogFrame) -> DialogResult<Self> {
        match frame.state.get(OPTIONS_KEY) {
            Some(value) => Self::parse(value.clone()),
            None => Ok(Self::default()),
        }
    }

    fn activity(&self, text: &str) -> Activity {
        if self.choices.is_empty() {
            Activity::text(text)
        } else {
            Activity::suggested(text, self.choices.iter().cloned())
        }
    }

    async fn send_prompt(&self, tc: &mut TurnContext) -> DialogResult<()> {
        if self.prompt.is_empty() {
            return Ok(());
        }
        tc.send(self.activity(&self.prompt)).await
    }

    async fn send_retry(&self, tc: &mut TurnContext, fallback: &str) -> DialogResult<()> {
        let text = match self.retry_prompt.as_deref() {
            Some(retry) => retry,
            None if !self.prompt.is_empty() => self.prompt.as_str(),
            None => fallback,
        };
        if text.is_empty() {
            return Ok(());
        }
        tc.send(self.activity(text)).await
    }
}

/// Words that answer a yes/no question outright.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationWords {
    yes: Vec<String>,
    no: Vec<String>,
}

impl Default for ConfirmationWords {
    fn default() -> Self {
        Self {
            yes: YES_WORDS.iter().map(|w| w.to_string()).collect(),
            no: NO_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }
}

impl ConfirmationWords {
    /// Uses the recognizer's word lists so prompts and entity extraction agree.
    pub fn from_config(config: &RecognizerConfig) -> Self {
        if config.yes_words.is_empty() && config.no_words.is_empty() {
            return Self::default();
        }
        let normalize = |words: &[String]| -> Vec<String> {
            words.iter().map(|w| w.trim().to_lowercase()).collect()
        };
        Self {
            yes: normalize(&config.yes_words),
            no: normalize(&config.no_words),
        }
    }

    /// Maps a free-text answer to yes/no.
    pub fn parse(&self, text: &str) -> Option<bool> {
        let normalized = text
            .trim()
            .trim_end_matches(['.', '!', '?'])
            .trim()
            .to_lowercase();
        if self.yes.iter().any(|w| *w == normalized) {
            Some(true)
        } else if self.no.iter().any(|w| *w == normalized) {
            Some(false)
        } else {
            None
        }
    }
}

fn card_confirmation(value: &Value) -> Option<bool> {
    if let Some(confirmed) = value.get("confirmed").and_then(Value::as_bool) {
        return Some(confirmed);
    }
    value
        .get(entities::CONFIRMATION)
        .and_then(Value::as_str)
        .map(|reading| reading == "yes")
}

/// Asks for free text and ends with whatever the user answers.
pub struct TextPrompt;

impl TextPrompt {
    pub async fn begin(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        options: Value,
    ) -> DialogResult<DialogTurn> {
        let options = PromptOptions::parse(options)?;
        options.save(frame)?;
        options.send_prompt(tc).await?;
        Ok(DialogTurn::Waiting)
    }

    pub async fn continue_dialog(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
    ) -> DialogResult<DialogTurn> {
        let answer = tc.text().trim().to_string();
        if answer.is_empty() {
            PromptOptions::load(frame)?.send_retry(tc, "").await?;
            return Ok(DialogTurn::Waiting);
        }
        if answer.eq_ignore_ascii_case("cancel") {
            tc.send_text(CANCELLED).await?;
            return Ok(DialogTurn::CancelAll);
        }
        Ok(DialogTurn::End(DialogValue::Text(answer)))
    }

    pub async fn resume(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
    ) -> DialogResult<DialogTurn> {
        PromptOptions::load(frame)?.send_prompt(tc).await?;
        Ok(DialogTurn::Waiting)
    }
}

/// Yes/no question ending with [`DialogValue::Confirmed`].
#[derive(Debug, Clone, Default)]
pub struct ConfirmPrompt {
    words: ConfirmationWords,
}

impl ConfirmPrompt {
    pub fn new(words: ConfirmationWords) -> Self {
        Self { words }
    }

    pub async fn begin(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
        options: Value,
    ) -> DialogResult<DialogTurn> {
        let mut options = PromptOptions::parse(options)?;
        if options.choices.is_empty() {
            options.choices = vec!["Yes".to_string(), "No".to_string()];
        }
        options.save(frame)?;
        options.send_prompt(tc).await?;
        Ok(DialogTurn::Waiting)
    }

    pub async fn continue_dialog(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
    ) -> DialogResult<DialogTurn> {
        let mut answer = tc
            .card_value()
            .and_then(card_confirmation)
            .or_else(|| self.words.parse(tc.text()));

        if answer.is_none() && !tc.text().trim().is_empty() {
            let recognized = tc.recognize().await?;
            answer = recognized
                .entities
                .iter()
                .find(|e| e.entity_name == entities::CONFIRMATION)
                .map(|e| e.primary() == "yes");
        }

        match answer {
            Some(confirmed) => Ok(DialogTurn::End(DialogValue::Confirmed(confirmed))),
            None => {
                PromptOptions::load(frame)?
                    .send_retry(tc, DEFAULT_CONFIRM_RETRY)
                    .await?;
                Ok(DialogTurn::Waiting)
            }
        }
    }

    pub async fn resume(
        &self,
        tc: &mut TurnContext,
        frame: &mut DialogFrame,
    ) -> DialogResult<DialogTurn> {
        PromptOptions::load(frame)?.send_prompt(tc).await?;
        Ok(DialogTurn::Waiting)
    }
}
