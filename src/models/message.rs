use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;

/// Header carrying the upstream action tag
pub const MOD_TYPE_HEADER: &str = "modType";

/// Upstream action tag, parsed case-insensitively from the `modType` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Insert,
    Update,
    Delete,
}

impl Action {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "insert" => Some(Action::Insert),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Insert => f.write_str("insert"),
            Action::Update => f.write_str("update"),
            Action::Delete => f.write_str("delete"),
        }
    }
}

/// Owned copy of a bus message, detached from the consumer's buffers
#[derive(Debug, Clone, Default)]
pub struct RawMessage {
    pub key: Option<Vec<u8>>,
    pub value: Option<Vec<u8>>,
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub timestamp: Option<DateTime<Utc>>,
    pub headers: HashMap<String, Vec<u8>>,
}

impl RawMessage {
    /// Raw `modType` header value, if present
    pub fn mod_type(&self) -> Option<String> {
        self.headers
            .get(MOD_TYPE_HEADER)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn action(&self) -> Option<Action> {
        self.mod_type().as_deref().and_then(Action::parse)
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.as_bytes().to_vec());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_is_case_insensitive() {
        assert_eq!(Action::parse("INSERT"), Some(Action::Insert));
        assert_eq!(Action::parse("Update"), Some(Action::Update));
        assert_eq!(Action::parse("delete"), Some(Action::Delete));
        assert_eq!(Action::parse("upsert"), None);
        assert_eq!(Action::parse(""), None);
    }

    #[test]
    fn test_action_from_headers() {
        let msg = RawMessage::default().with_header(MOD_TYPE_HEADER, "Delete");
        assert_eq!(msg.action(), Some(Action::Delete));
        assert_eq!(RawMessage::default().action(), None);
    }
}
