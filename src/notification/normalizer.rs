//! Turns raw frame bodies into [`Notification`]s.

use serde_json::{Map, Value};

use crate::metrics::NotificationMetrics;

use super::types::{Notification, TypeRule, TYPE_FIELD};

/// Result of decoding a frame body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Body was a JSON object
    Parsed(Map<String, Value>),
    /// Body was anything else, kept verbatim
    Raw(String),
}

impl Payload {
    pub fn parse(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(fields)) => Payload::Parsed(fields),
            _ => Payload::Raw(body.to_string()),
        }
    }
}

/// Normalize a frame body under a channel's type rule. Never fails.
pub fn normalize(body: &str, rule: &TypeRule) -> Notification {
    normalize_payload(Payload::parse(body), rule)
}

pub fn normalize_payload(payload: Payload, rule: &TypeRule) -> Notification {
    match payload {
        Payload::Parsed(fields) => {
            let payload_type = match fields.get(TYPE_FIELD) {
                Some(Value::String(tag)) if !tag.is_empty() => Some(tag.clone()),
                _ => None,
            };

            match (rule, payload_type) {
                (TypeRule::Forced(kind), payload_type) => {
                    if let Some(ref tag) = payload_type {
                        if tag != kind.as_str() {
                            tracing::debug!(
                                payload_type = %tag,
                                forced_type = %kind,
                                "Overriding payload type on forced channel"
                            );
                        }
                    }
                    Notification::with_type(fields, kind)
                }
                (TypeRule::Default(_), Some(tag)) => Notification::with_type(fields, &tag.into()),
                (TypeRule::Default(kind), None) => Notification::with_type(fields, kind),
            }
        }
        Payload::Raw(text) => {
            NotificationMetrics::record_fallback();
            Notification::plain(text, rule.fallback())
        }
    }
}
