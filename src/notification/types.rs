use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field carrying the notification type tag
pub const TYPE_FIELD: &str = "type";

/// Field carrying the text of a plain (non-JSON) notification
pub const MESSAGE_FIELD: &str = "message";

/// Notification type tag.
///
/// Channels only ever default to `job`, `update` or `system`; a payload may
/// carry its own tag, which is passed through as [`NotificationType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationType {
    Job,
    Update,
    System,
    Other(String),
}

impl NotificationType {
    pub fn as_str(&self) -> &str {
        match self {
            NotificationType::Job => "job",
            NotificationType::Update => "update",
            NotificationType::System => "system",
            NotificationType::Other(tag) => tag,
        }
    }
}

impl From<&str> for NotificationType {
    fn from(tag: &str) -> Self {
        match tag {
            "job" => NotificationType::Job,
            "update" => NotificationType::Update,
            "system" => NotificationType::System,
            other => NotificationType::Other(other.to_string()),
        }
    }
}

impl From<String> for NotificationType {
    fn from(tag: String) -> Self {
        NotificationType::from(tag.as_str())
    }
}

impl From<NotificationType> for String {
    fn from(kind: NotificationType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a channel resolves the `type` tag of its notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRule {
    /// Use the payload's own tag, falling back to this one
    Default(NotificationType),
    /// Always use this tag, whatever the payload says
    Forced(NotificationType),
}

impl TypeRule {
    pub fn fallback(&self) -> &NotificationType {
        match self {
            TypeRule::Default(kind) | TypeRule::Forced(kind) => kind,
        }
    }

    pub fn is_forced(&self) -> bool {
        matches!(self, TypeRule::Forced(_))
    }
}

/// A normalized notification: a JSON object that always carries a string `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notification {
    fields: Map<String, Value>,
}

impl Notification {
    /// Wrap payload fields, setting `type` to `kind`
    pub fn with_type(mut fields: Map<String, Value>, kind: &NotificationType) -> Self {
        fields.insert(TYPE_FIELD.to_string(), Value::String(kind.as_str().to_string()));
        Self { fields }
    }

    /// Build a plain-text notification
    pub fn plain(message: impl Into<String>, kind: &NotificationType) -> Self {
        let mut fields = Map::new();
        fields.insert(MESSAGE_FIELD.to_string(), Value::String(message.into()));
        Self::with_type(fields, kind)
    }

    pub fn kind(&self) -> NotificationType {
        match self.fields.get(TYPE_FIELD) {
            Some(Value::String(tag)) => NotificationType::from(tag.as_str()),
            // with_type guarantees a string tag
            _ => NotificationType::System,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.fields.get(MESSAGE_FIELD).and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.fields.clone()).to_string()
    }
}
