//! # steward-shared
//!
//! Types shared by every Steward notification crate: recipient and
//! notification identifiers, the notification record and its wire coercion,
//! the compose payload, and the Socket.IO frame codec spoken by the push
//! channel.

pub mod constants;
pub mod error;
pub mod protocol;
pub mod record;
pub mod types;

pub use error::ProtocolError;
pub use record::{coerce_notification_list, NotificationRecord, NotificationSnapshot};
pub use types::{NotificationId, NotificationTarget, OutgoingNotification, RecipientId};
