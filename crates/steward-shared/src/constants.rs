/// Default REST API base URL (includes the `/api` prefix)
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Path segment stripped from the API URL to derive the push-channel origin
pub const API_PATH_SEGMENT: &str = "api";

/// Socket.IO endpoint path on the push-channel origin
pub const SOCKET_IO_PATH: &str = "/socket.io/";

/// Engine.IO protocol revision spoken by the push channel
pub const ENGINE_IO_VERSION: &str = "4";

/// Query parameter carrying the recipient id on the push subscription
pub const RECIPIENT_QUERY_PARAM: &str = "memberId";

/// Push event carrying a freshly created notification
pub const EVENT_NEW_NOTIFICATION: &str = "new_notification";

/// Type label used when a record arrives without one
pub const DEFAULT_NOTIFICATION_TYPE: &str = "general";

/// Reconnect backoff base delay in seconds
pub const RECONNECT_BASE_DELAY_SECS: u64 = 2;

/// Reconnect backoff ceiling in seconds
pub const MAX_RECONNECT_DELAY_SECS: u64 = 60;

/// Default HTTP request timeout in seconds
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
