//! Intent and entity recognition for free-text turns.

use anyhow::Result;
use async_trait::async_trait;
use flightdesk_schema::{entities, intents, EntityValue, TurnProperties};

use crate::config::RecognizerConfig;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecognizerResult {
    /// `None` when no intent scored; callers fall back to the intent already
    /// carried by the turn.
    pub intent: Option<String>,
    pub entities: Vec<EntityValue>,
}

impl RecognizerResult {
    pub fn into_turn_properties(self) -> TurnProperties {
        TurnProperties::new(self.intent.unwrap_or_default(), self.entities)
    }
}

/// Natural-language understanding: one call per recognizing step.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, text: &str) -> Result<RecognizerResult>;
}

const CITY_WORDS: usize = 3;
const NAME_WORDS: usize = 2;

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "the", "to", "from", "for", "in", "on", "by", "with", "class", "ticket",
    "tickets", "please", "buy", "book", "go", "travel", "fly", "order", "get", "purchase", "be",
    "change", "cancel", "know", "see", "first", "second",
];

const NAME_MARKERS: &[&[&str]] = &[&["my", "name", "is"], &["name", "is"], &["i", "am"], &["for"]];

/// Rule-based recognizer driven by `recognizer.yaml`.
///
/// Entity spans are byte offsets into the input, end exclusive.
pub struct KeywordRecognizer {
    config: RecognizerConfig,
}

impl KeywordRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self { config }
    }

    pub fn recognize_text(&self, text: &str) -> RecognizerResult {
        let tokens = tokenize(text);
        if tokens.is_empty() {
            return RecognizerResult::default();
        }

        let mut found = Vec::new();
        if let Some(entity) = self.confirmation(&tokens) {
            found.push(entity);
        } else {
            found.extend(ticket_class(&tokens));
            found.extend(phrase_after(&tokens, &["from"], CITY_WORDS, entities::CITY_FROM));
            found.extend(phrase_after(&tokens, &["to"], CITY_WORDS, entities::CITY_TO));
            found.extend(
                NAME_MARKERS
                    .iter()
                    .find_map(|marker| phrase_after(&tokens, marker, NAME_WORDS, entities::PERSON_NAME)),
            );
        }

        let intent = self.match_intent(&tokens).or_else(|| {
            if found.is_empty() {
                None
            } else {
                Some(intents::CONTINUE_PROMPT.to_string())
            }
        });

        tracing::debug!(
            intent = intent.as_deref().unwrap_or(intents::NONE),
            entities = found.len(),
            "keyword recognizer scored turn"
        );

        RecognizerResult {
            intent,
            entities: found,
        }
    }

    fn match_intent(&self, tokens: &[Token<'_>]) -> Option<String> {
        let words: Vec<&str> = tokens.iter().map(|t| t.lower.as_str()).collect();
        self.config
            .intents
            .iter()
            .find(|rule| {
                rule.phrases.iter().any(|phrase| {
                    let needle: Vec<String> =
                        phrase.split_whitespace().map(str::to_lowercase).collect();
                    !needle.is_empty()
                        && words
                            .windows(needle.len())
                            .any(|window| window.iter().zip(&needle).all(|(w, n)| *w == n.as_str()))
                })
            })
            .map(|rule| rule.intent.clone())
    }

    fn confirmation(&self, tokens: &[Token<'_>]) -> Option<EntityValue> {
        let normalized = tokens
            .iter()
            .map(|t| t.lower.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        let reading = if contains_word(&self.config.yes_words, &normalized) {
            "yes".to_string()
        } else if contains_word(&self.config.no_words, &normalized) {
            normalized
        } else {
            return None;
        };
        let first = tokens.first()?;
        let last = tokens.last()?;
        Some(EntityValue::new(entities::CONFIRMATION, vec![reading]).with_span(first.start, last.end))
    }
}

#[async_trait]
impl Recognizer for KeywordRecognizer {
    async fn recognize(&self, text: &str) -> Result<RecognizerResult> {
        Ok(self.recognize_text(text))
    }
}

struct Token<'a> {
    raw: &'a str,
    lower: String,
    start: usize,
    end: usize,
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() || matches!(ch, ',' | '.' | '!' | '?' | ';' | ':') {
            if let Some(begin) = start.take() {
                tokens.push(token(text, begin, idx));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(begin) = start {
        tokens.push(token(text, begin, text.len()));
    }
    tokens
}

fn token(text: &str, start: usize, end: usize) -> Token<'_> {
    let raw = &text[start..end];
    Token {
        raw,
        lower: raw.to_lowercase(),
        start,
        end,
    }
}

fn contains_word(words: &[String], normalized: &str) -> bool {
    words.iter().any(|w| w.to_lowercase() == normalized)
}

fn ticket_class(tokens: &[Token<'_>]) -> Option<EntityValue> {
    tokens.iter().enumerate().find_map(|(idx, t)| {
        let class = match t.lower.as_str() {
            "first" => "First",
            "second" => "Second",
            _ => return None,
        };
        let next = tokens.get(idx + 1);
        let marked = next.is_some_and(|n| n.lower == "class");
        if !marked && tokens.len() > 1 {
            return None;
        }
        let end = next.filter(|_| marked).map_or(t.end, |n| n.end);
        Some(EntityValue::new(entities::TICKET_CLASS, vec![class.to_string()]).with_span(t.start, end))
    })
}

/// Collects up to `max_words` non-stop words after the first occurrence of
/// `marker` that is followed by any.
fn phrase_after(
    tokens: &[Token<'_>],
    marker: &[&str],
    max_words: usize,
    entity_name: &str,
) -> Option<EntityValue> {
    for idx in 0..tokens.len() {
        let matches_marker = marker
            .iter()
            .enumerate()
            .all(|(offset, word)| tokens.get(idx + offset).is_some_and(|t| t.lower == *word));
        if !matches_marker {
            continue;
        }

        let words: Vec<&Token<'_>> = tokens[idx + marker.len()..]
            .iter()
            .take_while(|t| !STOP_WORDS.contains(&t.lower.as_str()))
            .take(max_words)
            .collect();
        let (Some(first), Some(last)) = (words.first(), words.last()) else {
            continue;
        };

        let value = words
            .iter()
            .map(|t| capitalize(t.raw))
            .collect::<Vec<_>>()
            .join(" ");
        return Some(EntityValue::new(entity_name, vec![value]).with_span(first.start, last.end));
    }
    None
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntentRule;

    fn recognizer() -> KeywordRecognizer {
        KeywordRecognizer::new(RecognizerConfig {
            intents: vec![
                IntentRule {
                    intent: "noChange".into(),
                    phrases: vec!["no changes".into()],
                },
                IntentRule {
                    intent: "Cancel".into(),
                    phrases: vec!["cancel".into()],
                },
                IntentRule {
                    intent: "TicketList".into(),
                    phrases: vec!["my tickets".into()],
                },
                IntentRule {
                    intent: "TicketBuy".into(),
                    phrases: vec!["buy".into(), "book".into()],
                },
            ],
            yes_words: vec!["yes".into(), "sure".into()],
            no_words: vec!["no".into(), "edit".into()],
        })
    }

    fn value_of<'a>(result: &'a RecognizerResult, name: &str) -> Option<&'a str> {
        result
            .entities
            .iter()
            .find(|e| e.entity_name == name)
            .map(|e| e.primary())
    }

    #[test]
    fn full_purchase_sentence() {
        let result = recognizer()
            .recognize_text("Buy a first class ticket for alice smith from new york to Bath");
        assert_eq!(result.intent.as_deref(), Some("TicketBuy"));
        assert_eq!(value_of(&result, entities::TICKET_CLASS), Some("First"));
        assert_eq!(value_of(&result, entities::PERSON_NAME), Some("Alice Smith"));
        assert_eq!(value_of(&result, entities::CITY_FROM), Some("New York"));
        assert_eq!(value_of(&result, entities::CITY_TO), Some("Bath"));
    }

    #[test]
    fn entities_without_intent_continue_the_prompt() {
        let result = recognizer().recognize_text("from Lyon");
        assert_eq!(result.intent.as_deref(), Some(intents::CONTINUE_PROMPT));
        let city = &result.entities[0];
        assert_eq!(city.primary(), "Lyon");
        assert_eq!((city.start_index, city.end_index), (Some(5), Some(9)));
    }

    #[test]
    fn bare_class_word_is_a_class() {
        let result = recognizer().recognize_text("Second");
        assert_eq!(value_of(&result, entities::TICKET_CLASS), Some("Second"));
    }

    #[test]
    fn ordinal_without_class_marker_is_ignored() {
        let result = recognizer().recognize_text("first I want to go from Lyon");
        assert!(value_of(&result, entities::TICKET_CLASS).is_none());
        assert_eq!(value_of(&result, entities::CITY_FROM), Some("Lyon"));
        assert!(value_of(&result, entities::CITY_TO).is_none());
    }

    #[test]
    fn confirmation_words() {
        let yes = recognizer().recognize_text("Sure!");
        assert_eq!(value_of(&yes, entities::CONFIRMATION), Some("yes"));

        let edit = recognizer().recognize_text("Edit");
        assert_eq!(value_of(&edit, entities::CONFIRMATION), Some("edit"));
    }

    #[test]
    fn intent_phrases_match_whole_words() {
        let r = recognizer();
        assert_eq!(r.recognize_text("show my tickets").intent.as_deref(), Some("TicketList"));
        assert_eq!(r.recognize_text("No changes").intent.as_deref(), Some("noChange"));
        assert_eq!(r.recognize_text("buyer").intent, None);
    }

    #[test]
    fn gibberish_has_no_intent() {
        let result = recognizer().recognize_text("asdf qwerty");
        assert_eq!(result, RecognizerResult::default());
    }

    #[tokio::test]
    async fn trait_call_matches_direct_call() {
        let r = recognizer();
        let via_trait = r.recognize("cancel").await.unwrap();
        assert_eq!(via_trait.intent.as_deref(), Some("Cancel"));
        assert_eq!(via_trait.into_turn_properties().intent, "Cancel");
    }
}
