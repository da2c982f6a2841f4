//! REST access to the notification endpoints.
//!
//! The [`NotificationBackend`] trait is the seam the client synchronizer
//! talks to; [`HttpBackend`] is the reqwest implementation used in
//! production.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url};
use serde_json::Value;
use tracing::debug;

use steward_shared::{coerce_notification_list, NotificationId, NotificationRecord, OutgoingNotification, RecipientId};

use crate::error::ApiError;

#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// `GET /notifications/{recipient}`
    async fn fetch_notifications(&self, recipient: RecipientId) -> Result<Vec<NotificationRecord>, ApiError>;

    /// `PATCH /notifications/read/{id}`
    async fn mark_read(&self, id: &NotificationId) -> Result<(), ApiError>;

    /// `PATCH /notifications/read-all/{recipient}`
    async fn mark_all_read(&self, recipient: RecipientId) -> Result<(), ApiError>;

    /// `POST /notifications`
    async fn send(&self, notification: &OutgoingNotification) -> Result<(), ApiError>;
}

/// reqwest-backed [`NotificationBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    api_url: Url,
}

impl HttpBackend {
    /// Create a backend rooted at `api_url` (e.g. `http://localhost:5000/api`).
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let api_url = Url::parse(api_url.trim()).map_err(|e| ApiError::InvalidUrl(format!("{api_url}: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(api_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_url })
    }

    /// Append path segments to the API root, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.api_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, method: Method, url: Url, body: Option<&Value>) -> Result<reqwest::Response, ApiError> {
        debug!(%method, %url, "Backend request");
        let mut request = self.client.request(method, url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(ApiError::Status {
                status: resp.status().as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl NotificationBackend for HttpBackend {
    async fn fetch_notifications(&self, recipient: RecipientId) -> Result<Vec<NotificationRecord>, ApiError> {
        let url = self.endpoint(&["notifications", &recipient.to_string()])?;
        let body: Value = self.execute(Method::GET, url, None).await?.json().await?;
        Ok(coerce_notification_list(&body))
    }

    async fn mark_read(&self, id: &NotificationId) -> Result<(), ApiError> {
        let url = self.endpoint(&["notifications", "read", id.as_str()])?;
        self.execute(Method::PATCH, url, None).await?;
        Ok(())
    }

    async fn mark_all_read(&self, recipient: RecipientId) -> Result<(), ApiError> {
        let url = self.endpoint(&["notifications", "read-all", &recipient.to_string()])?;
        self.execute(Method::PATCH, url, None).await?;
        Ok(())
    }

    async fn send(&self, notification: &OutgoingNotification) -> Result<(), ApiError> {
        if notification.title.trim().is_empty() || notification.message.trim().is_empty() {
            return Err(ApiError::InvalidRequest("title and message are required".into()));
        }
        let url = self.endpoint(&["notifications"])?;
        self.execute(Method::POST, url, Some(&notification.to_body())).await?;
        Ok(())
    }
}
