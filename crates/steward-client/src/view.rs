//! Presentation helpers for a notification bell.

use tracing::warn;

use steward_shared::{NotificationId, NotificationRecord};

use crate::context::NotificationContext;
use crate::error::SyncError;

/// Records sharing a type label, in feed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationGroup<'a> {
    pub kind: &'a str,
    pub items: Vec<&'a NotificationRecord>,
}

/// Group records by type. Groups appear in the order their type first
/// shows up in the feed.
pub fn group_by_type(records: &[NotificationRecord]) -> Vec<NotificationGroup<'_>> {
    let mut groups: Vec<NotificationGroup<'_>> = Vec::new();
    for record in records {
        match groups.iter_mut().find(|g| g.kind == record.kind) {
            Some(group) => group.items.push(record),
            None => groups.push(NotificationGroup {
                kind: &record.kind,
                items: vec![record],
            }),
        }
    }
    groups
}

pub fn unread_summary(unread: usize) -> String {
    match unread {
        0 => "You're all caught up!".to_string(),
        1 => "You have 1 unread notification".to_string(),
        n => format!("You have {n} unread notifications"),
    }
}

/// Opens a notification's deep link in a new browsing context.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &str) -> std::io::Result<()>;
}

/// Activate a notification: mark it read and open its link, if any.
///
/// The link is opened even when the read request fails.
pub async fn open_notification(
    ctx: &NotificationContext,
    id: &NotificationId,
    opener: &dyn LinkOpener,
) -> Result<(), SyncError> {
    let url = ctx.get(id).and_then(|record| record.url);
    let marked = ctx.mark_as_read(id).await;

    if let Some(url) = url {
        if let Err(e) = opener.open(&url) {
            warn!(id = %id, url = %url, error = %e, "Failed to open notification link");
        }
    }

    marked
}
