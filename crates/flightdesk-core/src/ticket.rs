//! The ticket being purchased and the rules for merging recognized entities
//! into it.
//!
//! [`TicketBuyProperty::merge_with`] is pure: it clones the record, applies
//! every field rule against the *original* values, and reports what it
//! rejected. Callers decide whether to persist the result.

use std::collections::BTreeMap;
use std::fmt;

use flightdesk_schema::{entities, EntityValue, TurnProperties};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const DEFAULT_MIN_NAME_LENGTH: usize = 4;
pub const DEFAULT_MIN_CITY_LENGTH: usize = 4;

const CONFIRM_YES: &str = "yes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketClass {
    First,
    Second,
}

impl TicketClass {
    /// Only the exact labels are accepted.
    pub fn from_reading(reading: &str) -> Option<Self> {
        match reading {
            "First" => Some(Self::First),
            "Second" => Some(Self::Second),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "First",
            Self::Second => "Second",
        }
    }
}

impl fmt::Display for TicketClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Minimum field lengths, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRules {
    pub min_name_length: usize,
    pub min_city_length: usize,
}

impl Default for SlotRules {
    fn default() -> Self {
        Self {
            min_name_length: DEFAULT_MIN_NAME_LENGTH,
            min_city_length: DEFAULT_MIN_CITY_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    Complete,
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProblem {
    pub message: String,
    pub field: String,
}

impl UpdateProblem {
    fn new(message: impl Into<String>, field: &str) -> Self {
        Self {
            message: message.into(),
            field: field.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    pub record: TicketBuyProperty,
    pub status: UpdateStatus,
    pub problems: Vec<UpdateProblem>,
}

impl UpdateOutcome {
    pub fn has_problems(&self) -> bool {
        !self.problems.is_empty()
    }

    pub fn first_problem(&self) -> Option<&str> {
        self.problems.first().map(|p| p.message.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketBuyProperty {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[serde(default)]
    pub person_name: String,
    #[serde(default)]
    pub ticket_class: Option<TicketClass>,
    #[serde(default)]
    pub city_from: String,
    #[serde(default)]
    pub city_to: String,
    #[serde(default)]
    pub confirmed: Option<bool>,
    #[serde(default)]
    pub needs_change: Option<bool>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl Default for TicketBuyProperty {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4(),
            person_name: String::new(),
            ticket_class: None,
            city_from: String::new(),
            city_to: String::new(),
            confirmed: None,
            needs_change: None,
            metadata: BTreeMap::new(),
        }
    }
}

impl TicketBuyProperty {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_complete(&self) -> bool {
        !self.person_name.is_empty()
            && self.ticket_class.is_some()
            && !self.city_from.is_empty()
            && !self.city_to.is_empty()
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed == Some(true)
    }

    pub fn wants_change(&self) -> bool {
        self.needs_change == Some(true)
    }

    pub fn mark_confirmed(&mut self) {
        self.confirmed = Some(true);
        self.needs_change = None;
    }

    pub fn mark_needs_change(&mut self) {
        self.needs_change = Some(true);
        self.confirmed = None;
    }

    pub fn merge(&self, turn: &TurnProperties) -> UpdateOutcome {
        self.merge_with(turn, &SlotRules::default())
    }

    pub fn merge_with(&self, turn: &TurnProperties, rules: &SlotRules) -> UpdateOutcome {
        let mut record = self.clone();
        let mut problems = Vec::new();

        if !turn.has_entities() {
            return UpdateOutcome {
                record,
                status: UpdateStatus::Complete,
                problems,
            };
        }

        let person = turn.find(entities::PERSON_NAME);
        let class = turn.find(entities::TICKET_CLASS);
        let city_from = turn.find(entities::CITY_FROM);
        let city_to = turn.find(entities::CITY_TO);
        let confirmation = turn.find(entities::CONFIRMATION);

        if let Some(person) = person {
            let candidate = person.primary();
            let shadows_destination = city_to.is_some_and(|to| to.primary() == candidate);
            if !shadows_destination {
                if char_len(candidate) < rules.min_name_length {
                    problems.push(UpdateProblem::new(
                        format!(
                            "Sorry. Name should be at least {} characters long!",
                            rules.min_name_length
                        ),
                        entities::PERSON_NAME,
                    ));
                } else {
                    record.person_name = candidate.to_string();
                }
            }
        }

        if let Some(from) = city_from {
            // A second origin while the destination is still open is almost
            // always the destination misread as an origin.
            let duplicate_capture = !self.city_from.is_empty() && self.city_to.is_empty();
            if from.primary() != self.person_name && !duplicate_capture {
                match city_candidate(from, rules, entities::CITY_FROM) {
                    Ok(city) => record.city_from = city,
                    Err(problem) => problems.push(problem),
                }
            }
        }

        if let Some(to) = city_to {
            let distinct = to.primary() != self.city_from || to.disambiguated().is_some();
            if to.primary() != self.person_name && distinct {
                match city_candidate(to, rules, entities::CITY_TO) {
                    Ok(city) => record.city_to = city,
                    Err(problem) => problems.push(problem),
                }
            }
        }

        if let Some(class) = class {
            match TicketClass::from_reading(class.primary()) {
                Some(class) => record.ticket_class = Some(class),
                None => problems.push(UpdateProblem::new(
                    "Sorry. Unrecognised ticket class - you need to choose First or Second!",
                    entities::TICKET_CLASS,
                )),
            }
        }

        if let Some(confirmation) = confirmation {
            if confirmation.primary() == CONFIRM_YES {
                record.mark_confirmed();
            } else {
                record.mark_needs_change();
            }
        }

        let status = if problems.is_empty() {
            UpdateStatus::Complete
        } else {
            UpdateStatus::Incomplete
        };

        tracing::debug!(
            ticket_id = %record.id,
            entities = turn.entities.len(),
            problems = problems.len(),
            complete = record.is_complete(),
            "merged turn entities into ticket"
        );

        UpdateOutcome {
            record,
            status,
            problems,
        }
    }

    /// Asks for the first missing field in name, class, origin, destination
    /// order. Empty once the record is complete.
    pub fn missing_field_prompt(&self) -> &'static str {
        if self.person_name.is_empty() {
            "What is the passenger's full name?"
        } else if self.ticket_class.is_none() {
            "Which class would you like, First or Second?"
        } else if self.city_from.is_empty() {
            "Where are you travelling from?"
        } else if self.city_to.is_empty() {
            "Where are you travelling to?"
        } else {
            ""
        }
    }

    /// Echoes back what has been captured so far.
    pub fn grounded_summary(&self) -> String {
        if self.is_complete() {
            return self.confirmation_sentence();
        }
        if self.person_name.is_empty()
            && self.ticket_class.is_none()
            && self.city_from.is_empty()
            && self.city_to.is_empty()
        {
            return String::new();
        }

        let mut summary = String::from("Ok. I have a ");
        summary.push_str(&self.describe());
        summary.push('.');
        summary
    }

    pub fn confirmation_sentence(&self) -> String {
        format!("{}.", self.describe())
    }

    /// Extra guidance while the class is still open.
    pub fn contextual_help(&self) -> &'static str {
        if self.ticket_class.is_none() {
            "Tickets come in First or Second class. First class includes a reserved seat and meals."
        } else {
            ""
        }
    }

    fn describe(&self) -> String {
        let mut text = match self.ticket_class {
            Some(class) => format!("{class} class ticket"),
            None => String::from("ticket"),
        };
        if !self.person_name.is_empty() {
            text.push_str(" for ");
            text.push_str(&self.person_name);
        }
        if !self.city_from.is_empty() {
            text.push_str(" from ");
            text.push_str(&self.city_from);
        }
        if !self.city_to.is_empty() {
            text.push_str(" to ");
            text.push_str(&self.city_to);
        }
        text
    }
}

fn city_candidate(
    entity: &EntityValue,
    rules: &SlotRules,
    field: &str,
) -> Result<String, UpdateProblem> {
    let candidate = entity.disambiguated().unwrap_or_else(|| entity.primary());
    if char_len(candidate) < rules.min_city_length {
        return Err(UpdateProblem::new(
            format!(
                "Sorry. City name should be at least {} characters long!",
                rules.min_city_length
            ),
            field,
        ));
    }
    Ok(candidate.to_string())
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str, readings: &[&str]) -> EntityValue {
        EntityValue::new(name, readings.iter().map(|r| r.to_string()).collect())
    }

    fn turn(entities: Vec<EntityValue>) -> TurnProperties {
        TurnProperties::new("getTicketBuyFields", entities)
    }

    fn complete_ticket() -> TicketBuyProperty {
        TicketBuyProperty {
            person_name: "Alice".into(),
            ticket_class: Some(TicketClass::First),
            city_from: "Lyon".into(),
            city_to: "Bath".into(),
            ..TicketBuyProperty::default()
        }
    }

    #[test]
    fn empty_turn_is_a_complete_noop() {
        let record = complete_ticket();
        let outcome = record.merge(&TurnProperties::default());
        assert_eq!(outcome.status, UpdateStatus::Complete);
        assert!(outcome.problems.is_empty());
        assert_eq!(outcome.record, record);
    }

    #[test]
    fn merge_does_not_touch_input() {
        let record = TicketBuyProperty::new();
        let before = record.clone();
        let props = turn(vec![entity(entities::PERSON_NAME, &["Alice"])]);

        let first = record.merge(&props);
        let second = record.merge(&props);

        assert_eq!(record, before);
        assert_eq!(first.record, second.record);
        assert_eq!(first.record.person_name, "Alice");
    }

    #[test]
    fn confirmation_flags_are_exclusive() {
        let mut record = TicketBuyProperty::new();
        record.mark_needs_change();
        let confirmed = record
            .merge(&turn(vec![entity(entities::CONFIRMATION, &["yes"])]))
            .record;
        assert_eq!(confirmed.confirmed, Some(true));
        assert_eq!(confirmed.needs_change, None);

        let changed = confirmed
            .merge(&turn(vec![entity(entities::CONFIRMATION, &["edit"])]))
            .record;
        assert_eq!(changed.needs_change, Some(true));
        assert_eq!(changed.confirmed, None);
    }

    #[test]
    fn name_length_boundary() {
        let record = TicketBuyProperty::new();

        let accepted = record.merge(&turn(vec![entity(entities::PERSON_NAME, &["Anna"])]));
        assert_eq!(accepted.status, UpdateStatus::Complete);
        assert_eq!(accepted.record.person_name, "Anna");

        let rejected = record.merge(&turn(vec![entity(entities::PERSON_NAME, &["Ann"])]));
        assert_eq!(rejected.status, UpdateStatus::Incomplete);
        assert_eq!(rejected.problems.len(), 1);
        assert_eq!(rejected.problems[0].field, entities::PERSON_NAME);
        assert!(rejected.record.person_name.is_empty());
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let record = TicketBuyProperty::new();
        let outcome = record.merge(&turn(vec![entity(entities::CITY_FROM, &["Łódź"])]));
        assert!(!outcome.has_problems());
        assert_eq!(outcome.record.city_from, "Łódź");
    }

    #[test]
    fn city_length_boundary_uses_configured_rules() {
        let rules = SlotRules {
            min_name_length: 4,
            min_city_length: 5,
        };
        let outcome = TicketBuyProperty::new()
            .merge_with(&turn(vec![entity(entities::CITY_FROM, &["Lyon"])]), &rules);
        assert_eq!(
            outcome.first_problem(),
            Some("Sorry. City name should be at least 5 characters long!")
        );
    }

    #[test]
    fn rejected_fields_do_not_block_others() {
        let outcome = TicketBuyProperty::new().merge(&turn(vec![
            entity(entities::PERSON_NAME, &["Al"]),
            entity(entities::CITY_FROM, &["Lyon"]),
            entity(entities::TICKET_CLASS, &["Economy"]),
        ]));

        assert_eq!(outcome.status, UpdateStatus::Incomplete);
        assert_eq!(outcome.problems.len(), 2);
        assert_eq!(outcome.record.city_from, "Lyon");
        assert!(outcome.record.person_name.is_empty());
        assert!(outcome.record.ticket_class.is_none());
    }

    #[test]
    fn unknown_class_is_rejected() {
        let outcome =
            TicketBuyProperty::new().merge(&turn(vec![entity(entities::TICKET_CLASS, &["first"])]));
        assert_eq!(
            outcome.first_problem(),
            Some("Sorry. Unrecognised ticket class - you need to choose First or Second!")
        );
    }

    #[test]
    fn name_matching_destination_is_skipped_silently() {
        let outcome = TicketBuyProperty::new().merge(&turn(vec![
            entity(entities::PERSON_NAME, &["Paris"]),
            entity(entities::CITY_TO, &["Paris"]),
        ]));
        assert!(!outcome.has_problems());
        assert!(outcome.record.person_name.is_empty());
        assert_eq!(outcome.record.city_to, "Paris");
    }

    #[test]
    fn duplicate_origin_capture_is_ignored() {
        let record = TicketBuyProperty {
            city_from: "Lyon".into(),
            ..TicketBuyProperty::default()
        };
        let outcome = record.merge(&turn(vec![entity(entities::CITY_FROM, &["Paris"])]));
        assert_eq!(outcome.status, UpdateStatus::Complete);
        assert_eq!(outcome.record.city_from, "Lyon");
    }

    #[test]
    fn origin_matching_person_name_is_skipped() {
        let record = TicketBuyProperty {
            person_name: "Florence".into(),
            ..TicketBuyProperty::default()
        };
        let outcome = record.merge(&turn(vec![entity(entities::CITY_FROM, &["Florence"])]));
        assert!(outcome.record.city_from.is_empty());
    }

    #[test]
    fn cities_prefer_disambiguated_reading() {
        let outcome = TicketBuyProperty::new().merge(&turn(vec![
            entity(entities::CITY_FROM, &["NYC", "New York"]),
            entity(entities::CITY_TO, &["Bath", "Bath Spa"]),
        ]));
        assert!(!outcome.has_problems());
        assert_eq!(outcome.record.city_from, "New York");
        assert_eq!(outcome.record.city_to, "Bath Spa");
    }

    #[test]
    fn destination_equal_to_origin_needs_second_reading() {
        let record = TicketBuyProperty {
            city_from: "Lyon".into(),
            ..TicketBuyProperty::default()
        };

        let skipped = record.merge(&turn(vec![entity(entities::CITY_TO, &["Lyon"])]));
        assert!(skipped.record.city_to.is_empty());

        let accepted = record.merge(&turn(vec![entity(entities::CITY_TO, &["Lyon", "Lyon Part-Dieu"])]));
        assert_eq!(accepted.record.city_to, "Lyon Part-Dieu");
    }

    #[test]
    fn is_complete_requires_all_four_fields() {
        let full = complete_ticket();
        assert!(full.is_complete());

        let mut missing_name = full.clone();
        missing_name.person_name.clear();
        let mut missing_class = full.clone();
        missing_class.ticket_class = None;
        let mut missing_from = full.clone();
        missing_from.city_from.clear();
        let mut missing_to = full.clone();
        missing_to.city_to.clear();

        for record in [missing_name, missing_class, missing_from, missing_to] {
            assert!(!record.is_complete());
        }
    }

    #[test]
    fn class_and_name_then_origin_prompt() {
        let outcome = TicketBuyProperty::new().merge(&turn(vec![
            entity(entities::TICKET_CLASS, &["First"]),
            entity(entities::PERSON_NAME, &["Alice"]),
        ]));

        assert_eq!(outcome.status, UpdateStatus::Complete);
        assert!(!outcome.record.is_complete());
        assert_eq!(
            outcome.record.missing_field_prompt(),
            "Where are you travelling from?"
        );
        assert_eq!(
            outcome.record.grounded_summary(),
            "Ok. I have a First class ticket for Alice."
        );
    }

    #[test]
    fn prompts_follow_field_order() {
        let mut record = TicketBuyProperty::new();
        assert_eq!(record.missing_field_prompt(), "What is the passenger's full name?");
        record.person_name = "Alice".into();
        assert_eq!(
            record.missing_field_prompt(),
            "Which class would you like, First or Second?"
        );
        record.ticket_class = Some(TicketClass::Second);
        record.city_from = "Lyon".into();
        assert_eq!(record.missing_field_prompt(), "Where are you travelling to?");
        record.city_to = "Bath".into();
        assert_eq!(record.missing_field_prompt(), "");
    }

    #[test]
    fn summary_texts() {
        assert_eq!(TicketBuyProperty::new().grounded_summary(), "");

        let partial = TicketBuyProperty {
            city_from: "Lyon".into(),
            ..TicketBuyProperty::default()
        };
        assert_eq!(partial.grounded_summary(), "Ok. I have a ticket from Lyon.");

        let full = complete_ticket();
        assert_eq!(
            full.confirmation_sentence(),
            "First class ticket for Alice from Lyon to Bath."
        );
        assert_eq!(full.grounded_summary(), full.confirmation_sentence());
    }

    #[test]
    fn contextual_help_only_while_class_missing() {
        assert!(!TicketBuyProperty::new().contextual_help().is_empty());
        assert!(complete_ticket().contextual_help().is_empty());
    }

    #[test]
    fn stored_json_without_optional_fields_loads() {
        let record: TicketBuyProperty =
            serde_json::from_value(serde_json::json!({"person_name": "Alice"})).unwrap();
        assert_eq!(record.person_name, "Alice");
        assert!(record.ticket_class.is_none());
        assert!(record.confirmed.is_none());
    }
}
