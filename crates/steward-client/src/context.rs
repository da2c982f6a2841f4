//! The notification context: one store per active recipient, fed by the
//! bootstrap fetch and the push channel, mutated by read-state calls.
//!
//! [`NotificationContext`] is cheap to clone and is meant to be owned by the
//! application root and handed to whatever renders notifications. Background
//! work (bootstrap and channel pump) runs in tokio tasks tagged with the
//! activation generation; a task whose generation is no longer current can
//! never touch the store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use steward_net::{ChannelEvent, HttpBackend, NotificationBackend, PushConnector, SocketIoConnector, SubscriptionCloser};
use steward_shared::{NotificationId, NotificationRecord, NotificationSnapshot, RecipientId};

use crate::alert::{raise_alert, Alerter};
use crate::config::ClientConfig;
use crate::error::SyncError;
use crate::store::{NotificationStore, PushOutcome};

#[derive(Clone)]
pub struct NotificationContext {
    shared: Arc<Shared>,
}

struct Shared {
    backend: Arc<dyn NotificationBackend>,
    connector: Arc<dyn PushConnector>,
    alerter: Arc<dyn Alerter>,
    state: Mutex<ContextState>,
    snapshot_tx: watch::Sender<NotificationSnapshot>,
    permission_requested: AtomicBool,
}

#[derive(Default)]
struct ContextState {
    generation: u64,
    activation: Option<Activation>,
}

/// Everything owned on behalf of one recipient.
struct Activation {
    recipient: RecipientId,
    generation: u64,
    store: NotificationStore,
    closer: Option<SubscriptionCloser>,
    tasks: Vec<AbortHandle>,
}

impl Activation {
    fn teardown(mut self) {
        if let Some(mut closer) = self.closer.take() {
            closer.close();
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!(recipient = %self.recipient, generation = self.generation, "Activation torn down");
    }
}

impl NotificationContext {
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        connector: Arc<dyn PushConnector>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(NotificationSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                backend,
                connector,
                alerter,
                state: Mutex::new(ContextState::default()),
                snapshot_tx,
                permission_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Build a context wired to the HTTP backend and Socket.IO channel
    /// described by `config`.
    pub fn from_config(config: &ClientConfig, alerter: Arc<dyn Alerter>) -> Result<Self, SyncError> {
        let backend = HttpBackend::new(&config.api_url, config.http_timeout)?;
        let connector = SocketIoConnector::new(&config.socket_url)?;
        Ok(Self::new(Arc::new(backend), Arc::new(connector), alerter))
    }

    /// Switch the active recipient.
    ///
    /// The previous subscription is closed before anything else happens.
    /// `None` leaves the context idle with an empty store. Must be called
    /// from within a tokio runtime.
    pub fn set_recipient(&self, recipient: Option<RecipientId>) {
        let mut state = self.shared.lock_state();

        let current = state.activation.as_ref().map(|a| a.recipient);
        if current == recipient && recipient.is_some() {
            return;
        }

        if let Some(previous) = state.activation.take() {
            info!(recipient = %previous.recipient, "Deactivating notifications");
            previous.teardown();
        }
        state.generation += 1;

        let Some(recipient) = recipient else {
            self.shared.snapshot_tx.send_replace(NotificationSnapshot::default());
            return;
        };

        self.shared.request_permission_once();

        let generation = state.generation;
        let mut activation = Activation {
            recipient,
            generation,
            store: NotificationStore::new(),
            closer: None,
            tasks: Vec::with_capacity(2),
        };

        match self.shared.connector.subscribe(recipient) {
            Ok(subscription) => {
                let (events, closer) = subscription.into_parts();
                activation.closer = Some(closer);
                let pump = tokio::spawn(pump_channel(Arc::downgrade(&self.shared), generation, events));
                activation.tasks.push(pump.abort_handle());
            }
            Err(e) => {
                error!(recipient = %recipient, error = %e, "Failed to open notification channel");
            }
        }

        let loader = tokio::spawn(bootstrap(Arc::downgrade(&self.shared), generation, recipient));
        activation.tasks.push(loader.abort_handle());

        info!(recipient = %recipient, generation, "Activated notifications");

        self.shared
            .snapshot_tx
            .send_replace(activation.store.snapshot(Some(recipient)));
        state.activation = Some(activation);
    }

    /// Validate a raw identity and switch to it; invalid input deactivates.
    pub fn set_recipient_raw(&self, raw: &str) {
        match RecipientId::parse(raw) {
            Ok(recipient) => self.set_recipient(Some(recipient)),
            Err(e) => {
                debug!(error = %e, "Invalid recipient, notifications disabled");
                self.set_recipient(None);
            }
        }
    }

    pub fn deactivate(&self) {
        self.set_recipient(None);
    }

    /// Mark one notification read.
    ///
    /// The local record is updated before the request is sent and is not
    /// rolled back if the request fails.
    pub async fn mark_as_read(&self, id: &NotificationId) -> Result<(), SyncError> {
        let was_unread = self.shared.update(None, |store| store.mark_read_local(id)).ok_or(SyncError::Inactive)?;
        debug!(id = %id, was_unread, "Marked notification read locally");

        if let Err(e) = self.shared.backend.mark_read(id).await {
            error!(id = %id, error = %e, "Error marking notification as read");
            return Err(e.into());
        }
        Ok(())
    }

    /// Mark every notification of the active recipient read.
    ///
    /// The store only changes once the backend confirms. Returns `Ok(false)`
    /// when no recipient is active.
    pub async fn mark_all_as_read(&self) -> Result<bool, SyncError> {
        let Some((recipient, generation)) = self.shared.current() else {
            return Ok(false);
        };

        if let Err(e) = self.shared.backend.mark_all_read(recipient).await {
            error!(recipient = %recipient, error = %e, "Error marking all notifications as read");
            return Err(e.into());
        }

        self.shared.update(Some(generation), |store| store.mark_all_read_local());
        info!(recipient = %recipient, "Marked all notifications read");
        Ok(true)
    }

    /// Receiver that observes every store change.
    pub fn watch(&self) -> watch::Receiver<NotificationSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> NotificationSnapshot {
        let state = self.shared.lock_state();
        match &state.activation {
            Some(activation) => activation.store.snapshot(Some(activation.recipient)),
            None => NotificationSnapshot::default(),
        }
    }

    pub fn recipient(&self) -> Option<RecipientId> {
        self.shared.current().map(|(recipient, _)| recipient)
    }

    pub fn is_active(&self) -> bool {
        self.recipient().is_some()
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.snapshot().notifications
    }

    pub fn unread_count(&self) -> usize {
        let state = self.shared.lock_state();
        state.activation.as_ref().map(|a| a.store.unread_count()).unwrap_or(0)
    }

    pub fn get(&self, id: &NotificationId) -> Option<NotificationRecord> {
        let state = self.shared.lock_state();
        state.activation.as_ref().and_then(|a| a.store.get(id).cloned())
    }

    pub fn is_bootstrapped(&self) -> bool {
        let state = self.shared.lock_state();
        state.activation.as_ref().map(|a| a.store.is_bootstrapped()).unwrap_or(false)
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn current(&self) -> Option<(RecipientId, u64)> {
        let state = self.lock_state();
        state.activation.as_ref().map(|a| (a.recipient, a.generation))
    }

    fn request_permission_once(&self) {
        if !self.permission_requested.swap(true, Ordering::SeqCst) {
            let permission = self.alerter.request_permission();
            debug!(?permission, "Requested notification permission");
        }
    }

    /// Apply `f` to the active store and publish the new snapshot. With a
    /// generation, the update is dropped unless that activation is current.
    fn update<R>(&self, generation: Option<u64>, f: impl FnOnce(&mut NotificationStore) -> R) -> Option<R> {
        let mut state = self.lock_state();
        let activation = state.activation.as_mut()?;
        if generation.is_some_and(|g| g != activation.generation) {
            return None;
        }
        let result = f(&mut activation.store);
        self.snapshot_tx
            .send_replace(activation.store.snapshot(Some(activation.recipient)));
        Some(result)
    }

    fn handle_push(&self, generation: u64, payload: &serde_json::Value) {
        let record = match NotificationRecord::from_wire(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Dropping malformed pushed notification");
                return;
            }
        };

        let id = record.id.clone();
        match self.update(Some(generation), |store| store.apply_push(record)) {
            Some(PushOutcome::Alert(record)) => {
                debug!(id = %id, "New unread notification");
                raise_alert(self.alerter.as_ref(), &record);
            }
            Some(PushOutcome::Duplicate) => debug!(id = %id, "Ignoring duplicate notification"),
            Some(PushOutcome::Stored) => debug!(id = %id, "Stored notification without alert"),
            None => debug!(id = %id, generation, "Dropping notification from stale channel"),
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(activation) = state.activation.take() {
            activation.teardown();
        }
    }
}

async fn bootstrap(shared: Weak<Shared>, generation: u64, recipient: RecipientId) {
    let Some(backend) = shared.upgrade().map(|s| Arc::clone(&s.backend)) else {
        return;
    };

    match backend.fetch_notifications(recipient).await {
        Ok(records) => {
            let count = records.len();
            let Some(shared) = shared.upgrade() else {
                return;
            };
            if shared.update(Some(generation), |store| store.apply_bootstrap(records)).is_some() {
                info!(recipient = %recipient, count, "Loaded notifications");
            }
        }
        Err(e) => {
            error!(recipient = %recipient, error = %e, "Failed to fetch notifications");
        }
    }
}

async fn pump_channel(shared: Weak<Shared>, generation: u64, mut events: mpsc::Receiver<ChannelEvent>) {
    while let Some(event) = events.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        match event {
            ChannelEvent::Connected => info!(generation, "Notification channel connected"),
            ChannelEvent::Disconnected { reason } => warn!(generation, reason = %reason, "Notification channel disconnected"),
            ChannelEvent::Notification(payload) => shared.handle_push(generation, &payload),
        }
    }
    debug!(generation, "Notification channel pump finished");
}
