// REST and push-channel transports for the notification client.

pub mod api;
pub mod channel;
pub mod error;
pub mod socketio;

pub use api::{HttpBackend, NotificationBackend};
pub use channel::{ChannelEvent, ManualConnector, PushConnector, Subscription, SubscriptionCloser};
pub use error::{ApiError, ChannelError};
pub use socketio::{socket_endpoint, SocketIoConnector};
