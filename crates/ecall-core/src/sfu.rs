use std::sync::{Arc, Weak};

use async_trait::async_trait;
use livekit::prelude::{Room, RoomEvent, RoomOptions};
use thiserror::Error;
use tokio::sync::{Mutex, mpsc};

use crate::errors::CallError;

/// Where and how to reach the SFU for the chosen focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SfuConfig {
    pub url: String,
    pub jwt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailureReason {
    NotAllowed,
    ServerUnreachable,
    InternalError,
    Cancelled,
    Unknown,
}

/// A failed attempt to connect to the SFU.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{reason:?} (status {status:?}): {message}")]
pub struct ConnectFailure {
    pub reason: ConnectFailureReason,
    pub status: Option<u16>,
    pub message: String,
}

impl ConnectFailure {
    pub fn new(reason: ConnectFailureReason, status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            reason,
            status,
            message: message.into(),
        }
    }

    /// Self-hosted LiveKit answers 503 when full, LiveKit Cloud 429.
    pub fn is_capacity_limit(&self) -> bool {
        matches!(
            (self.reason, self.status),
            (ConnectFailureReason::InternalError, Some(503)) | (ConnectFailureReason::NotAllowed, Some(429))
        )
    }

    /// Classify an SDK error from its message. The HTTP status is only taken
    /// from the signal client's `client error: NNN` / `server error: NNN` text.
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_ascii_lowercase();
        let status = signal_status(&lower);
        let reason = match status {
            Some(401 | 403 | 429) => ConnectFailureReason::NotAllowed,
            Some(500..=599) => ConnectFailureReason::InternalError,
            _ if lower.contains("cancel") => ConnectFailureReason::Cancelled,
            _ if lower.contains("timeout") || lower.contains("timed out") || lower.contains("connect") => {
                ConnectFailureReason::ServerUnreachable
            }
            _ => ConnectFailureReason::Unknown,
        };
        Self::new(reason, status, message)
    }
}

fn signal_status(lower: &str) -> Option<u16> {
    ["client error: ", "server error: "].iter().find_map(|prefix| {
        let rest = &lower[lower.find(prefix)? + prefix.len()..];
        let code = rest.get(..3)?;
        if rest[3..].starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        code.parse::<u16>().ok().filter(|code| (400..600).contains(code))
    })
}

impl From<ConnectFailure> for CallError {
    fn from(failure: ConnectFailure) -> Self {
        if failure.is_capacity_limit() {
            CallError::InsufficientCapacity
        } else {
            CallError::Connection(failure.to_string())
        }
    }
}

/// Connection lifecycle reported by a connector after a successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SfuEvent {
    Reconnecting,
    Reconnected,
    Disconnected { reason: String },
}

#[async_trait]
pub trait SfuConnector: Send + Sync {
    async fn connect(&self, config: &SfuConfig) -> Result<mpsc::UnboundedReceiver<SfuEvent>, ConnectFailure>;

    async fn disconnect(&self);
}

/// [`SfuConnector`] backed by a LiveKit room.
pub struct LiveKitConnector {
    room: Arc<Mutex<Option<Arc<Room>>>>,
}

impl LiveKitConnector {
    pub fn new() -> Self {
        Self {
            room: Arc::new(Mutex::new(None)),
        }
    }

    async fn event_loop(
        mut events: mpsc::UnboundedReceiver<RoomEvent>,
        tx: mpsc::UnboundedSender<SfuEvent>,
        room: Weak<Room>,
        room_ref: Arc<Mutex<Option<Arc<Room>>>>,
    ) {
        while let Some(event) = events.recv().await {
            let mapped = match event {
                RoomEvent::Reconnecting => SfuEvent::Reconnecting,
                RoomEvent::Reconnected => SfuEvent::Reconnected,
                RoomEvent::Disconnected { reason } => {
                    tracing::info!("room disconnected: {reason:?}");
                    let mut current = room_ref.lock().await;
                    if current.as_ref().is_some_and(|r| std::ptr::eq(Arc::as_ptr(r), room.as_ptr())) {
                        *current = None;
                    }
                    let _ = tx.send(SfuEvent::Disconnected {
                        reason: format!("{reason:?}"),
                    });
                    break;
                }
                _ => {
                    tracing::debug!("unhandled room event: {event:?}");
                    continue;
                }
            };
            if tx.send(mapped).is_err() {
                break;
            }
        }
        tracing::info!("room event loop ended");
    }
}

impl Default for LiveKitConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SfuConnector for LiveKitConnector {
    async fn connect(&self, config: &SfuConfig) -> Result<mpsc::UnboundedReceiver<SfuEvent>, ConnectFailure> {
        let mut options = RoomOptions::default();
        options.auto_subscribe = true;

        let (room, events) = Room::connect(&config.url, &config.jwt, options)
            .await
            .map_err(|e| ConnectFailure::from_message(&e.to_string()))?;
        let room = Arc::new(room);
        tracing::info!(url = %config.url, "connected to livekit room");

        *self.room.lock().await = Some(room.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        let weak = Arc::downgrade(&room);
        let room_ref = self.room.clone();
        tokio::spawn(async move {
            Self::event_loop(events, tx, weak, room_ref).await;
        });
        Ok(rx)
    }

    async fn disconnect(&self) {
        let room = self.room.lock().await.take();
        if let Some(room) = room {
            if let Err(e) = room.close().await {
                tracing::warn!("error closing room: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn livekit_track_limit_is_capacity() {
        let failure = ConnectFailure::new(ConnectFailureReason::InternalError, Some(503), "");
        assert!(failure.is_capacity_limit());
        assert!(matches!(CallError::from(failure), CallError::InsufficientCapacity));
    }

    #[test]
    fn livekit_cloud_track_limit_is_capacity() {
        let failure = ConnectFailure::new(ConnectFailureReason::NotAllowed, Some(429), "");
        assert!(matches!(CallError::from(failure), CallError::InsufficientCapacity));
    }

    #[test]
    fn other_failures_are_connection_errors() {
        let failure = ConnectFailure::new(ConnectFailureReason::NotAllowed, Some(401), "bad token");
        assert!(!failure.is_capacity_limit());
        assert!(matches!(CallError::from(failure), CallError::Connection(_)));
    }

    #[test]
    fn classify_from_message() {
        let f = ConnectFailure::from_message("signal failure: Client error: 429 Too Many Requests");
        assert_eq!((f.reason, f.status), (ConnectFailureReason::NotAllowed, Some(429)));
        assert!(f.is_capacity_limit());

        let f = ConnectFailure::from_message("signal failure: Server error: 503 Service Unavailable - track limit");
        assert_eq!((f.reason, f.status), (ConnectFailureReason::InternalError, Some(503)));
        assert!(f.is_capacity_limit());

        let f = ConnectFailure::from_message("failed to connect: timed out");
        assert_eq!((f.reason, f.status), (ConnectFailureReason::ServerUnreachable, None));

        let f = ConnectFailure::from_message("something odd, code 1234");
        assert_eq!((f.reason, f.status), (ConnectFailureReason::Unknown, None));
    }

    #[test]
    fn stray_numbers_are_not_statuses() {
        let f = ConnectFailure::from_message("room 429 closed after 503 ms");
        assert_eq!(f.status, None);
        assert!(!f.is_capacity_limit());

        let f = ConnectFailure::from_message("signal failure: client error: 404 Not Found (room 429)");
        assert_eq!((f.reason, f.status), (ConnectFailureReason::Unknown, Some(404)));
        assert!(!f.is_capacity_limit());

        let f = ConnectFailure::from_message("server error: 5031");
        assert_eq!(f.status, None);
    }
}
