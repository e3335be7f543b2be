use thiserror::Error;

use crate::events::TrackKind;

#[derive(Debug, Error)]
pub enum CallError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("the SFU has insufficient capacity for this call")]
    InsufficientCapacity,
    #[error("room error: {0}")]
    Room(String),
    #[error("no LiveKit focus could be found for domain {domain:?}")]
    FocusMissing { domain: Option<String> },
    #[error("discovery failed: {0}")]
    Discovery(String),
    #[error("widget transport error: {0}")]
    Widget(String),
    #[error("no {0:?} input device available")]
    DeviceUnavailable(TrackKind),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("operation cancelled by session teardown")]
    Cancelled,
}

impl CallError {
    /// Translation key used by UI shells to render this error.
    pub fn translation_key(&self) -> &'static str {
        match self {
            CallError::InsufficientCapacity => "error.insufficient_capacity",
            CallError::FocusMissing { .. } => "error.call_is_not_supported",
            CallError::Connection(_) | CallError::Http(_) => "error.connection_lost",
            _ => "error.generic",
        }
    }
}
