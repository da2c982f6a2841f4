//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the client works against a local backend
//! with no configuration at all.

use std::time::Duration;

use steward_shared::constants::{API_PATH_SEGMENT, DEFAULT_API_URL, DEFAULT_HTTP_TIMEOUT_SECS};
use steward_shared::RecipientId;

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// REST API base URL, including the `/api` prefix.
    /// Env: `STEWARD_API_URL`
    /// Default: `http://localhost:5000/api`
    pub api_url: String,

    /// Push-channel origin.
    /// Env: `STEWARD_SOCKET_URL`
    /// Default: the API URL with its first `api` path segment removed.
    pub socket_url: String,

    /// Member whose notifications are followed.
    /// Env: `STEWARD_MEMBER_ID`
    /// Default: none (notifications disabled).
    pub member_id: Option<RecipientId>,

    /// Whether to ring the terminal bell on new notifications.
    /// Env: `STEWARD_SOUND` (true/false)
    /// Default: `true`
    pub sound: bool,

    /// Timeout for REST requests.
    /// Env: `STEWARD_HTTP_TIMEOUT_SECS`
    /// Default: 15 seconds
    pub http_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: derive_socket_url(DEFAULT_API_URL),
            member_id: None,
            sound: true,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("STEWARD_API_URL").filter(|v| !v.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }

        // The socket origin follows the API URL unless set explicitly.
        config.socket_url = match lookup("STEWARD_SOCKET_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url.trim().to_string(),
            None => derive_socket_url(&config.api_url),
        };

        if let Some(raw) = lookup("STEWARD_MEMBER_ID") {
            match RecipientId::parse(&raw) {
                Ok(id) => config.member_id = Some(id),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid STEWARD_MEMBER_ID, notifications disabled");
                }
            }
        }

        if let Some(val) = lookup("STEWARD_SOUND") {
            match parse_flag(&val) {
                Some(sound) => config.sound = sound,
                None => {
                    tracing::warn!(value = %val, "Invalid STEWARD_SOUND, using default");
                }
            }
        }

        if let Some(val) = lookup("STEWARD_HTTP_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.http_timeout = Duration::from_secs(secs),
                _ => {
                    tracing::warn!(value = %val, "Invalid STEWARD_HTTP_TIMEOUT_SECS, using default");
                }
            }
        }

        config
    }

    /// Override the API URL, re-deriving the socket origin when it was derived.
    pub fn with_api_url(mut self, api_url: &str) -> Self {
        let derived = self.socket_url == derive_socket_url(&self.api_url);
        self.api_url = api_url.trim().to_string();
        if derived {
            self.socket_url = derive_socket_url(&self.api_url);
        }
        self
    }
}

fn parse_flag(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Drop the first `api` path segment from the API URL to get the
/// push-channel origin. The scheme and host are never touched.
pub fn derive_socket_url(api_url: &str) -> String {
    let api_url = api_url.trim();
    let authority_start = api_url.find("://").map(|i| i + 3).unwrap_or(0);
    let (origin, path) = match api_url[authority_start..].find('/') {
        Some(i) => api_url.split_at(authority_start + i),
        None => (api_url, ""),
    };

    let mut stripped = false;
    let rest: Vec<&str> = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .filter(|segment| {
            if !stripped && *segment == API_PATH_SEGMENT {
                stripped = true;
                return false;
            }
            true
        })
        .collect();

    if rest.is_empty() {
        origin.to_string()
    } else {
        format!("{origin}/{}", rest.join("/"))
    }
}
