//! The notification record and its coercion from untrusted wire payloads.
//!
//! Both the bootstrap fetch and the push channel hand us loosely typed JSON.
//! Everything downstream only ever sees a [`NotificationRecord`].

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::constants::DEFAULT_NOTIFICATION_TYPE;
use crate::error::ProtocolError;
use crate::types::{NotificationId, RecipientId};

/// A single notification as held by the client store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: NotificationId,
    /// Category label, only used to group records for display.
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub message: String,
    /// Deep link opened when the record is activated.
    pub url: Option<String>,
    pub is_read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl NotificationRecord {
    pub fn new(id: impl Into<NotificationId>, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DEFAULT_NOTIFICATION_TYPE.to_string(),
            title: title.into(),
            message: message.into(),
            url: None,
            is_read: false,
            created_at: None,
        }
    }

    /// Coerce a JSON value into a record.
    ///
    /// Only the `id` is mandatory. Missing text fields become empty strings,
    /// `is_read` tolerates the integer and string forms SQL backends emit,
    /// and an unparseable `created_at` is dropped rather than rejected.
    pub fn from_wire(value: &Value) -> Result<Self, ProtocolError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::MalformedRecord(format!("expected object, got {}", type_name(value))))?;

        let id = obj
            .get("id")
            .and_then(NotificationId::from_wire)
            .ok_or_else(|| ProtocolError::MalformedRecord("missing or invalid id".into()))?;

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_NOTIFICATION_TYPE)
            .to_string();

        let url = obj
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(Self {
            id,
            kind,
            title: text_field(obj.get("title")),
            message: text_field(obj.get("message")),
            url,
            is_read: obj.get("is_read").map(read_flag).unwrap_or(false),
            created_at: obj.get("created_at").and_then(Value::as_str).and_then(parse_timestamp),
        })
    }
}

/// Extract the record list from a `GET /notifications/{id}` body.
///
/// A body without a `notifications` array yields an empty list. Individual
/// entries that fail coercion are skipped.
pub fn coerce_notification_list(body: &Value) -> Vec<NotificationRecord> {
    let list = body.get("notifications").unwrap_or(&Value::Null);
    let Some(items) = list.as_array() else {
        let kind = type_name(list);
        warn!(kind, "Bootstrap payload has no notification array");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match NotificationRecord::from_wire(item) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping malformed notification");
                None
            }
        })
        .collect()
}

/// Read-only view of the store published to presentation consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationSnapshot {
    pub recipient: Option<RecipientId>,
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
}

fn text_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn read_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(s.trim(), "true" | "1"),
        _ => false,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
