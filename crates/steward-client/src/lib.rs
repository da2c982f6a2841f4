//! # steward-client
//!
//! Client-side notification synchronization for the Steward console.
//!
//! A [`NotificationContext`] keeps one [`NotificationStore`] per active
//! member: seeded by the bootstrap fetch, extended by the push channel and
//! updated by the read-state calls. Alert side effects go through the
//! [`Alerter`] capability.

pub mod alert;
pub mod config;
pub mod context;
pub mod error;
pub mod store;
pub mod view;

pub use alert::{raise_alert, AlertError, Alerter, Permission, TerminalAlerter};
pub use config::ClientConfig;
pub use context::NotificationContext;
pub use error::SyncError;
pub use store::{NotificationStore, PushOutcome};
pub use view::{group_by_type, open_notification, unread_summary, LinkOpener, NotificationGroup};
