use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Entity labels produced by the recognizer (or carried in card input).
pub mod entities {
    pub const PERSON_NAME: &str = "personName";
    pub const TICKET_CLASS: &str = "ticket_class";
    pub const CITY_FROM: &str = "cityFrom";
    pub const CITY_TO: &str = "cityTo";
    pub const CONFIRMATION: &str = "confirmationList";
}

/// Intent labels understood by the dialogs.
pub mod intents {
    pub const TICKET_BUY: &str = "TicketBuy";
    pub const TICKET_LIST: &str = "TicketList";
    pub const ADMIN: &str = "Admin";
    pub const HELP: &str = "Help";
    pub const CANCEL: &str = "Cancel";
    pub const CONTINUE_PROMPT: &str = "getTicketBuyFields";
    pub const NO_CHANGE: &str = "noChange";
    pub const INTERRUPTIONS: &str = "Interruptions";
    pub const NONE: &str = "None";
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Intent {
    TicketBuy,
    TicketList,
    Admin,
    Help,
    Cancel,
    /// The user is answering the slot-filling prompt.
    ContinuePrompt,
    NoChange,
    Interruptions,
    None,
    Other(String),
}

impl Intent {
    pub fn from_label(label: &str) -> Self {
        match label {
            intents::TICKET_BUY => Self::TicketBuy,
            intents::TICKET_LIST => Self::TicketList,
            intents::ADMIN => Self::Admin,
            intents::HELP => Self::Help,
            intents::CANCEL => Self::Cancel,
            intents::CONTINUE_PROMPT => Self::ContinuePrompt,
            intents::NO_CHANGE => Self::NoChange,
            intents::INTERRUPTIONS => Self::Interruptions,
            "" | "none" | intents::NONE => Self::None,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_label(&self) -> &str {
        match self {
            Self::TicketBuy => intents::TICKET_BUY,
            Self::TicketList => intents::TICKET_LIST,
            Self::Admin => intents::ADMIN,
            Self::Help => intents::HELP,
            Self::Cancel => intents::CANCEL,
            Self::ContinuePrompt => intents::CONTINUE_PROMPT,
            Self::NoChange => intents::NO_CHANGE,
            Self::Interruptions => intents::INTERRUPTIONS,
            Self::None => intents::NONE,
            Self::Other(label) => label.as_str(),
        }
    }
}

/// One recognized slot candidate.
///
/// `entity_value[0]` is the primary reading; `entity_value[1]`, when present,
/// is a disambiguated reading that takes precedence for city slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityValue {
    pub entity_name: String,
    pub entity_value: Vec<String>,
    #[serde(default)]
    pub start_index: Option<usize>,
    #[serde(default)]
    pub end_index: Option<usize>,
}

impl EntityValue {
    pub fn new(name: impl Into<String>, readings: Vec<String>) -> Self {
        Self {
            entity_name: name.into(),
            entity_value: readings,
            start_index: None,
            end_index: None,
        }
    }

    pub fn with_span(mut self, start: usize, end: usize) -> Self {
        self.start_index = Some(start);
        self.end_index = Some(end);
        self
    }

    pub fn primary(&self) -> &str {
        self.entity_value.first().map(String::as_str).unwrap_or("")
    }

    pub fn disambiguated(&self) -> Option<&str> {
        self.entity_value.get(1).map(String::as_str)
    }
}

/// Intent and entities recognized for a single turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnProperties {
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub entities: Vec<EntityValue>,
}

impl TurnProperties {
    pub fn new(intent: impl Into<String>, entities: Vec<EntityValue>) -> Self {
        Self {
            intent: intent.into(),
            entities,
        }
    }

    /// Builds turn properties from a structured card submission.
    ///
    /// Cards carry an `intent` field; every other field is an entity named
    /// after its key. Strings become a single reading, arrays keep their
    /// order, nulls are dropped.
    pub fn from_card_input(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return Self::default();
        };

        let intent = object
            .get("intent")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let entities = object
            .iter()
            .filter(|(key, _)| key.as_str() != "intent")
            .filter_map(|(key, value)| {
                let readings = card_readings(value);
                if readings.is_empty() {
                    None
                } else {
                    Some(EntityValue::new(key.clone(), readings))
                }
            })
            .collect();

        Self { intent, entities }
    }

    pub fn intent(&self) -> Intent {
        Intent::from_label(&self.intent)
    }

    pub fn find(&self, entity_name: &str) -> Option<&EntityValue> {
        self.entities
            .iter()
            .find(|entity| entity.entity_name == entity_name)
    }

    pub fn has_entities(&self) -> bool {
        !self.entities.is_empty()
    }
}

fn card_readings(value: &Value) -> Vec<String> {
    match value {
        Value::Null => vec![],
        Value::String(text) => vec![text.clone()],
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum ActivityKind {
    #[default]
    Message,
    ConversationUpdate {
        #[serde(default)]
        members_added: Vec<String>,
    },
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub trace_id: Uuid,
    pub channel_type: String,
    pub connector_id: String,
    pub conversation_scope: String,
    pub user_scope: String,
    #[serde(default)]
    pub kind: ActivityKind,
    #[serde(default)]
    pub text: String,
    /// Structured card submission, if the user pressed a card action.
    #[serde(default)]
    pub value: Option<Value>,
    pub at: DateTime<Utc>,
    /// Id of the bot account this activity was addressed to
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn text(
        channel_type: impl Into<String>,
        conversation_scope: impl Into<String>,
        user_scope: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        let channel_type = channel_type.into();
        Self {
            trace_id: Uuid::new_v4(),
            connector_id: channel_type.clone(),
            channel_type,
            conversation_scope: conversation_scope.into(),
            user_scope: user_scope.into(),
            kind: ActivityKind::Message,
            text: text.into(),
            value: None,
            at: Utc::now(),
            recipient_id: None,
            attachments: vec![],
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }
}

/// Media attachment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    /// URL or file path
    pub url: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Document,
    Other,
}

/// Content the bot sends back to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Activity {
    Text {
        text: String,
    },
    SuggestedActions {
        text: String,
        actions: Vec<String>,
    },
    Card {
        card: Value,
    },
}

impl Activity {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn suggested<I, S>(text: impl Into<String>, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SuggestedActions {
            text: text.into(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// Plain-text rendering, used for logs and terminal output.
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            Self::SuggestedActions { text, actions } => {
                format!("{text} [{}]", actions.join(" | "))
            }
            Self::Card { card } => format!("<card {card}>"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub trace_id: Uuid,
    pub channel_type: String,
    pub connector_id: String,
    pub conversation_scope: String,
    pub activity: Activity,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BusMessage {
    TurnAccepted {
        trace_id: Uuid,
        conversation_key: String,
    },
    ReplyReady {
        outbound: OutboundMessage,
    },
    TurnFailed {
        trace_id: Uuid,
        error: String,
    },
    TicketSubmitted {
        ticket_id: Uuid,
        conversation_key: String,
        person_name: String,
    },
}

/// Identifies one conversation; all dialog state is scoped to it.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationKey(pub String);

impl ConversationKey {
    pub fn from_inbound(msg: &InboundMessage) -> Self {
        Self(format!(
            "{}:{}:{}",
            msg.channel_type, msg.connector_id, msg.conversation_scope
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
