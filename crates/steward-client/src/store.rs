//! In-memory notification store.
//!
//! Holds the newest-first record list, the unread counter and the set of ids
//! that have already been alerted on. All mutation goes through the four
//! transition methods; each leaves `unread` equal to the number of unread
//! records.

use std::collections::HashSet;

use tracing::debug;

use steward_shared::{NotificationId, NotificationRecord, NotificationSnapshot, RecipientId};

/// Result of merging a pushed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The id was already in the store; nothing changed.
    Duplicate,
    /// Stored without an alert (already read, or alerted before).
    Stored,
    /// Stored and the alert side effect should fire for this record.
    Alert(NotificationRecord),
}

#[derive(Debug, Clone, Default)]
pub struct NotificationStore {
    records: Vec<NotificationRecord>,
    unread: usize,
    /// Ids loaded by bootstrap or already alerted on.
    seen: HashSet<NotificationId>,
    bootstrapped: bool,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the bootstrap list.
    ///
    /// Records pushed before the bootstrap resolved and absent from `loaded`
    /// stay in front. A record already marked read locally stays read.
    pub fn apply_bootstrap(&mut self, loaded: Vec<NotificationRecord>) {
        let previous = std::mem::take(&mut self.records);
        let mut ids: HashSet<NotificationId> = HashSet::with_capacity(previous.len() + loaded.len());
        let mut merged = Vec::with_capacity(previous.len() + loaded.len());

        let loaded_ids: HashSet<&NotificationId> = loaded.iter().map(|r| &r.id).collect();
        for record in previous.iter().filter(|r| !loaded_ids.contains(&r.id)) {
            ids.insert(record.id.clone());
            merged.push(record.clone());
        }

        for mut record in loaded {
            if !ids.insert(record.id.clone()) {
                continue;
            }
            if previous.iter().any(|p| p.id == record.id && p.is_read) {
                record.is_read = true;
            }
            self.seen.insert(record.id.clone());
            merged.push(record);
        }

        self.records = merged;
        self.unread = self.count_unread();
        self.bootstrapped = true;

        debug!(total = self.records.len(), unread = self.unread, "Bootstrap applied");
    }

    /// Merge a record delivered by the push channel.
    pub fn apply_push(&mut self, record: NotificationRecord) -> PushOutcome {
        if self.contains(&record.id) {
            return PushOutcome::Duplicate;
        }

        let alert = !record.is_read && self.seen.insert(record.id.clone());
        if !record.is_read {
            self.unread += 1;
        }
        self.records.insert(0, record.clone());

        if alert {
            PushOutcome::Alert(record)
        } else {
            PushOutcome::Stored
        }
    }

    /// Mark one record read. Returns whether it was unread before the call.
    pub fn mark_read_local(&mut self, id: &NotificationId) -> bool {
        let Some(record) = self.records.iter_mut().find(|r| &r.id == id) else {
            return false;
        };
        if record.is_read {
            return false;
        }
        record.is_read = true;
        self.unread = self.unread.saturating_sub(1);
        true
    }

    pub fn mark_all_read_local(&mut self) {
        for record in &mut self.records {
            record.is_read = true;
        }
        self.unread = 0;
    }

    pub fn records(&self) -> &[NotificationRecord] {
        &self.records
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn get(&self, id: &NotificationId) -> Option<&NotificationRecord> {
        self.records.iter().find(|r| &r.id == id)
    }

    pub fn contains(&self, id: &NotificationId) -> bool {
        self.get(id).is_some()
    }

    pub fn has_alerted(&self, id: &NotificationId) -> bool {
        self.seen.contains(id)
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn snapshot(&self, recipient: Option<RecipientId>) -> NotificationSnapshot {
        NotificationSnapshot {
            recipient,
            notifications: self.records.clone(),
            unread_count: self.unread,
        }
    }

    fn count_unread(&self) -> usize {
        self.records.iter().filter(|r| !r.is_read).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unread(id: u64) -> NotificationRecord {
        NotificationRecord::new(id, format!("title {id}"), "body")
    }

    fn read(id: u64) -> NotificationRecord {
        NotificationRecord {
            is_read: true,
            ..unread(id)
        }
    }

    fn ids(store: &NotificationStore) -> Vec<&str> {
        store.records().iter().map(|r| r.id.as_str()).collect()
    }

    fn assert_consistent(store: &NotificationStore) {
        assert_eq!(store.unread_count(), store.count_unread());
        let unique: HashSet<_> = store.records().iter().map(|r| &r.id).collect();
        assert_eq!(unique.len(), store.len());
    }

    #[test]
    fn test_bootstrap_counts_unread_and_marks_seen() {
        let mut store = NotificationStore::new();
        store.apply_bootstrap(vec![unread(2), read(1), unread(0)]);

        assert_eq!(store.unread_count(), 2);
        assert!(store.is_bootstrapped());
        assert!(store.has_alerted(&NotificationId::from(1)));
        assert_consistent(&store);
    }

    #[test]
    fn test_bootstrap_dedupes_loaded_list() {
        let mut store = NotificationStore::new();
        store.apply_bootstrap(vec![unread(2), unread(2), unread(1)]);
        assert_eq!(ids(&store), ["2", "1"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_push_prepends_and_alerts_once() {
        let mut store = NotificationStore::new();
        store.apply_bootstrap(vec![unread(1)]);

        assert_eq!(store.apply_push(unread(2)), PushOutcome::Alert(unread(2)));
        assert_eq!(store.apply_push(unread(2)), PushOutcome::Duplicate);
        assert_eq!(ids(&store), ["2", "1"]);
        assert_eq!(store.unread_count(), 2);
        assert_consistent(&store);
    }

    #[test]
    fn test_push_of_read_record_does_not_alert() {
        let mut store = NotificationStore::new();
        assert_eq!(store.apply_push(read(5)), PushOutcome::Stored);
        assert_eq!(store.unread_count(), 0);
        assert!(!store.has_alerted(&NotificationId::from(5)));
    }

    #[test]
    fn test_duplicate_pushes_keep_ids_unique() {
        let mut store = NotificationStore::new();
        for id in [1, 2, 1, 3, 2, 2, 1] {
            store.apply_push(unread(id));
        }
        assert_eq!(ids(&store), ["3", "2", "1"]);
        assert_eq!(store.unread_count(), 3);
        assert_consistent(&store);
    }

    #[test]
    fn test_push_before_bootstrap_survives() {
        let mut store = NotificationStore::new();
        assert!(matches!(store.apply_push(unread(3)), PushOutcome::Alert(_)));

        store.apply_bootstrap(vec![unread(2), unread(1)]);

        assert_eq!(ids(&store), ["3", "2", "1"]);
        assert_eq!(store.unread_count(), 3);
        assert_consistent(&store);
    }

    #[test]
    fn test_push_before_bootstrap_of_same_id_is_not_duplicated() {
        let mut store = NotificationStore::new();
        store.apply_push(unread(2));
        store.apply_bootstrap(vec![unread(2), unread(1)]);

        assert_eq!(ids(&store), ["2", "1"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_bootstrap_keeps_local_read_state() {
        let mut store = NotificationStore::new();
        store.apply_push(unread(2));
        store.mark_read_local(&NotificationId::from(2));

        store.apply_bootstrap(vec![unread(2), unread(1)]);

        assert!(store.get(&NotificationId::from(2)).unwrap().is_read);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_mark_read_is_idempotent() {
        let mut store = NotificationStore::new();
        store.apply_bootstrap(vec![unread(2), unread(1)]);

        assert!(store.mark_read_local(&NotificationId::from(1)));
        assert!(!store.mark_read_local(&NotificationId::from(1)));
        assert_eq!(store.unread_count(), 1);
        assert_consistent(&store);
    }

    #[test]
    fn test_mark_read_unknown_or_read_record() {
        let mut store = NotificationStore::new();
        store.apply_bootstrap(vec![read(1)]);

        assert!(!store.mark_read_local(&NotificationId::from(1)));
        assert!(!store.mark_read_local(&NotificationId::from(99)));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_mark_all_read() {
        let mut store = NotificationStore::new();
        store.apply_bootstrap(vec![unread(3), read(2), unread(1)]);
        store.mark_all_read_local();

        assert_eq!(store.unread_count(), 0);
        assert!(store.records().iter().all(|r| r.is_read));
        assert_consistent(&store);
    }

    #[test]
    fn test_snapshot() {
        let mut store = NotificationStore::new();
        store.apply_push(unread(1));
        let rid = RecipientId::from_u64(42);
        let snap = store.snapshot(rid);
        assert_eq!(snap.recipient, rid);
        assert_eq!(snap.unread_count, 1);
        assert_eq!(snap.notifications.len(), 1);
    }
}
