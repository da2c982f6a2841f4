use thiserror::Error;

use steward_net::{ApiError, ChannelError};

/// Errors surfaced by the notification context.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No valid recipient is active.
    #[error("No active recipient")]
    Inactive,

    #[error("Backend error: {0}")]
    Api(#[from] ApiError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}
