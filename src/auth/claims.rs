use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Claims carried by a marketplace bearer token.
///
/// Every field is optional: the notification client only reads what it needs
/// and leaves validation of the token itself to the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (usually the username or e-mail)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Marketplace role (`STUDENT`, `EMPLOYER`, `ADMIN`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Numeric or string user identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<serde_json::Value>,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Claims {
    /// The role claim, or an empty string when absent
    pub fn role(&self) -> &str {
        self.role.as_deref().unwrap_or("")
    }

    /// The user identifier rendered as a string, if present
    pub fn user_id(&self) -> Option<String> {
        match self.user_id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn is_expired(&self) -> bool {
        match self.exp {
            Some(exp) => exp < chrono::Utc::now().timestamp(),
            None => false,
        }
    }
}
