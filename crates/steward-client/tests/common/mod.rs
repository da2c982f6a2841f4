use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use steward_client::{AlertError, Alerter, NotificationContext, Permission};
use steward_net::{ApiError, ManualConnector, NotificationBackend};
use steward_shared::{NotificationId, NotificationRecord, NotificationSnapshot, OutgoingNotification, RecipientId};

#[derive(Default)]
pub struct FakeBackend {
    lists: Mutex<HashMap<u64, Vec<NotificationRecord>>>,
    gate: Option<Arc<Semaphore>>,
    pub fail_fetch: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub fail_mark_all: AtomicBool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bootstrap fetches block until [`Semaphore::add_permits`] is called on the gate.
    pub fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                gate: Some(Arc::clone(&gate)),
                ..Self::default()
            },
            gate,
        )
    }

    pub fn with_list(self, recipient: u64, records: Vec<NotificationRecord>) -> Self {
        self.lists.lock().unwrap().insert(recipient, records);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record_call(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

fn backend_down() -> ApiError {
    ApiError::Status {
        status: 503,
        url: "http://backend.test/api".into(),
    }
}

#[async_trait]
impl NotificationBackend for FakeBackend {
    async fn fetch_notifications(&self, recipient: RecipientId) -> Result<Vec<NotificationRecord>, ApiError> {
        self.record_call(format!("fetch:{recipient}"));
        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        Ok(self.lists.lock().unwrap().get(&recipient.get()).cloned().unwrap_or_default())
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), ApiError> {
        self.record_call(format!("read:{id}"));
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        Ok(())
    }

    async fn mark_all_read(&self, recipient: RecipientId) -> Result<(), ApiError> {
        self.record_call(format!("read-all:{recipient}"));
        if self.fail_mark_all.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        Ok(())
    }

    async fn send(&self, notification: &OutgoingNotification) -> Result<(), ApiError> {
        self.record_call(format!("send:{}", notification.title));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlerter {
    pub permission_requests: AtomicUsize,
    pub sounds: AtomicUsize,
    pub native: Mutex<Vec<String>>,
}

impl RecordingAlerter {
    pub fn native_titles(&self) -> Vec<String> {
        self.native.lock().unwrap().clone()
    }

    pub fn sound_count(&self) -> usize {
        self.sounds.load(Ordering::SeqCst)
    }
}

impl Alerter for RecordingAlerter {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    fn request_permission(&self) -> Permission {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        Permission::Granted
    }

    fn play_sound(&self) -> Result<(), AlertError> {
        self.sounds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn show_native(&self, title: &str, _body: &str) -> Result<(), AlertError> {
        self.native.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

pub struct Harness {
    pub ctx: NotificationContext,
    pub backend: Arc<FakeBackend>,
    pub connector: ManualConnector,
    pub alerter: Arc<RecordingAlerter>,
}

impl Harness {
    pub fn new(backend: FakeBackend) -> Self {
        let backend = Arc::new(backend);
        let connector = ManualConnector::new();
        let alerter = Arc::new(RecordingAlerter::default());
        let ctx = NotificationContext::new(backend.clone(), Arc::new(connector.clone()), alerter.clone());
        Self {
            ctx,
            backend,
            connector,
            alerter,
        }
    }
}

pub fn rid(id: u64) -> RecipientId {
    RecipientId::from_u64(id).unwrap()
}

pub fn unread(id: u64) -> NotificationRecord {
    NotificationRecord::new(id, format!("Notification {id}"), "Body")
}

pub fn read(id: u64) -> NotificationRecord {
    NotificationRecord {
        is_read: true,
        ..unread(id)
    }
}

pub fn wire(id: u64, is_read: bool) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "type": "donation",
        "title": format!("Notification {id}"),
        "message": "Body",
        "is_read": is_read,
        "created_at": "2024-05-01T10:00:00Z"
    })
}

pub fn ids(snapshot: &NotificationSnapshot) -> Vec<String> {
    snapshot.notifications.iter().map(|r| r.id.to_string()).collect()
}

/// Wait until the published snapshot satisfies `pred`.
pub async fn wait_until(ctx: &NotificationContext, pred: impl Fn(&NotificationSnapshot) -> bool) {
    let mut rx = ctx.watch();
    let found = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| pred(s)))
        .await
        .expect("timed out waiting for snapshot")
        .is_ok();
    assert!(found, "snapshot channel closed");
}

/// Give spawned tasks a chance to run.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
