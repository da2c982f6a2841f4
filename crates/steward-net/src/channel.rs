//! Delivery channel abstraction.
//!
//! A [`PushConnector`] opens one [`Subscription`] per recipient. The
//! subscription yields [`ChannelEvent`]s until it is closed; closing is
//! synchronous and guarantees the transport stops producing events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use steward_shared::RecipientId;

use crate::error::ChannelError;

/// Buffered events per subscription before the transport applies backpressure.
pub const CHANNEL_CAPACITY: usize = 64;

/// Events delivered by a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// The server accepted the subscription.
    Connected,
    /// The connection dropped; the transport may reconnect on its own.
    Disconnected { reason: String },
    /// Raw `new_notification` payload, not yet validated.
    Notification(Value),
}

/// Opens push subscriptions.
pub trait PushConnector: Send + Sync {
    /// Open a subscription for `recipient`. Must be called from within a
    /// tokio runtime; the connection itself is established in the background.
    fn subscribe(&self, recipient: RecipientId) -> Result<Subscription, ChannelError>;
}

/// Tears a subscription down. Runs its close action at most once, on
/// [`close`](Self::close) or on drop.
pub struct SubscriptionCloser {
    on_close: Option<Box<dyn FnOnce() + Send + 'static>>,
}

impl SubscriptionCloser {
    pub fn new(on_close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            on_close: Some(Box::new(on_close)),
        }
    }

    pub fn close(&mut self) {
        if let Some(on_close) = self.on_close.take() {
            on_close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.on_close.is_none()
    }
}

impl Drop for SubscriptionCloser {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SubscriptionCloser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionCloser")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// An open push subscription for one recipient.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<ChannelEvent>,
    closer: SubscriptionCloser,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<ChannelEvent>, closer: SubscriptionCloser) -> Self {
        Self { events, closer }
    }

    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    /// Split into the event stream and the closer so they can be owned by
    /// different tasks.
    pub fn into_parts(self) -> (mpsc::Receiver<ChannelEvent>, SubscriptionCloser) {
        (self.events, self.closer)
    }
}

/// In-process connector: events are injected by the caller instead of a
/// socket. Each `subscribe` call gets its own channel; the sender for the
/// most recent subscription of a recipient is available via
/// [`sender`](Self::sender).
#[derive(Clone, Default)]
pub struct ManualConnector {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Default)]
struct ManualState {
    next_key: u64,
    open: HashMap<u64, (RecipientId, mpsc::Sender<ChannelEvent>)>,
    opened_total: usize,
}

impl ManualConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender of the newest open subscription for `recipient`.
    pub fn sender(&self, recipient: RecipientId) -> Option<mpsc::Sender<ChannelEvent>> {
        let state = self.inner.lock().ok()?;
        state
            .open
            .iter()
            .filter(|(_, (rid, _))| *rid == recipient)
            .max_by_key(|(key, _)| **key)
            .map(|(_, (_, tx))| tx.clone())
    }

    /// Deliver a raw notification to the newest open subscription of
    /// `recipient`. Returns `false` when nothing is listening.
    pub fn push(&self, recipient: RecipientId, payload: Value) -> bool {
        self.send(recipient, ChannelEvent::Notification(payload))
    }

    pub fn send(&self, recipient: RecipientId, event: ChannelEvent) -> bool {
        match self.sender(recipient) {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Number of subscriptions currently open.
    pub fn open_count(&self) -> usize {
        self.inner.lock().map(|s| s.open.len()).unwrap_or(0)
    }

    /// Number of subscriptions ever opened.
    pub fn opened_total(&self) -> usize {
        self.inner.lock().map(|s| s.opened_total).unwrap_or(0)
    }

    pub fn is_open(&self, recipient: RecipientId) -> bool {
        self.inner
            .lock()
            .map(|s| s.open.values().any(|(rid, _)| *rid == recipient))
            .unwrap_or(false)
    }
}

impl PushConnector for ManualConnector {
    fn subscribe(&self, recipient: RecipientId) -> Result<Subscription, ChannelError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let key = {
            let mut state = self
                .inner
                .lock()
                .map_err(|e| ChannelError::Handshake(format!("Lock poisoned: {e}")))?;
            let key = state.next_key;
            state.next_key += 1;
            state.opened_total += 1;
            state.open.insert(key, (recipient, tx));
            key
        };

        debug!(recipient = %recipient, key, "Manual subscription opened");

        let inner = Arc::clone(&self.inner);
        let closer = SubscriptionCloser::new(move || {
            if let Ok(mut state) = inner.lock() {
                state.open.remove(&key);
            }
            debug!(recipient = %recipient, key, "Manual subscription closed");
        });

        Ok(Subscription::new(rx, closer))
    }
}
