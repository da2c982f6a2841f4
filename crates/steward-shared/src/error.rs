use thiserror::Error;

/// Errors raised while decoding data received from the backend or the push
/// channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed notification record: {0}")]
    MalformedRecord(String),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Unknown Engine.IO packet type: {0:?}")]
    UnknownEnginePacket(char),

    #[error("Unknown Socket.IO packet type: {0:?}")]
    UnknownSocketPacket(char),

    #[error("Invalid packet payload: {0}")]
    InvalidPayload(String),

    #[error("Invalid recipient id: {0:?}")]
    InvalidRecipient(String),
}
