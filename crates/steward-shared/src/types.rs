use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

// Recipient identity = church member id (positive integer)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RecipientId(pub NonZeroU64);

impl RecipientId {
    /// Validate a raw identity. Only a positive base-10 integer is accepted;
    /// zero, blanks and anything non-numeric disable the notification feed.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        raw.trim()
            .parse::<u64>()
            .ok()
            .and_then(NonZeroU64::new)
            .map(Self)
            .ok_or_else(|| ProtocolError::InvalidRecipient(raw.to_string()))
    }

    pub fn from_u64(id: u64) -> Option<Self> {
        NonZeroU64::new(id).map(Self)
    }

    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for RecipientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RecipientId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Backend-assigned notification id. Opaque; only compared for equality.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accept the id shapes the backend emits: strings and integers.
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self(s.trim().to_string())),
            Value::Number(n) if n.is_u64() || n.is_i64() => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for NotificationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Audience of a composed notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationTarget {
    Member(RecipientId),
    Group(String),
    Department(String),
    Global,
}

/// Payload for `POST /notifications`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingNotification {
    pub target: NotificationTarget,
    pub title: String,
    pub message: String,
    pub via_email: bool,
    pub via_sms: bool,
}

impl OutgoingNotification {
    pub fn new(target: NotificationTarget, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target,
            title: title.into(),
            message: message.into(),
            via_email: true,
            via_sms: false,
        }
    }

    /// Build the JSON body in the shape the backend reads.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("title".into(), Value::String(self.title.clone()));
        body.insert("message".into(), Value::String(self.message.clone()));
        body.insert("viaEmail".into(), Value::Bool(self.via_email));
        body.insert("viaSms".into(), Value::Bool(self.via_sms));

        match &self.target {
            NotificationTarget::Member(id) => {
                body.insert("member_id".into(), Value::from(id.get()));
            }
            NotificationTarget::Group(id) => {
                body.insert("group_id".into(), Value::String(id.clone()));
            }
            NotificationTarget::Department(id) => {
                body.insert("department_id".into(), Value::String(id.clone()));
            }
            NotificationTarget::Global => {
                body.insert("is_global".into(), Value::Bool(true));
            }
        }

        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_recipient_parse_accepts_positive_integers() {
        assert_eq!(RecipientId::parse("42").unwrap().get(), 42);
        assert_eq!(RecipientId::parse(" 7 ").unwrap().get(), 7);
    }

    #[test]
    fn test_recipient_parse_rejects_invalid() {
        for raw in ["", "0", "-3", "abc", "4.2", "null"] {
            assert!(RecipientId::parse(raw).is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn test_notification_id_from_wire() {
        assert_eq!(NotificationId::from_wire(&json!(17)), Some(NotificationId::from(17)));
        assert_eq!(NotificationId::from_wire(&json!("a-1")), Some(NotificationId::new("a-1")));
        assert_eq!(NotificationId::from_wire(&json!(null)), None);
        assert_eq!(NotificationId::from_wire(&json!("  ")), None);
        assert_eq!(NotificationId::from_wire(&json!(1.5)), None);
    }

    #[test]
    fn test_outgoing_body_targets() {
        let member = RecipientId::from_u64(9).unwrap();
        let body = OutgoingNotification::new(NotificationTarget::Member(member), "Hi", "Service at 10")
            .to_body();
        assert_eq!(body["member_id"], json!(9));
        assert_eq!(body["viaEmail"], json!(true));
        assert_eq!(body["viaSms"], json!(false));

        let body = OutgoingNotification::new(NotificationTarget::Group("youth".into()), "t", "m").to_body();
        assert_eq!(body["group_id"], json!("youth"));
        assert!(body.get("member_id").is_none());

        let body = OutgoingNotification::new(NotificationTarget::Global, "t", "m").to_body();
        assert_eq!(body["is_global"], json!(true));
    }
}
