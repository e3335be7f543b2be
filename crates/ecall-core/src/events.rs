use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Events emitted by the core to UI listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum CallEvent {
    ConnectionStateChanged(EcConnectionState),
    MuteStateChanged { kind: TrackKind, enabled: bool },
    SessionJoined { room_id: String },
    SessionLeft { reason: LeaveReason },
}

/// SFU connection state, extended with the focus-switch phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    SwitchingFocus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

/// Why the local user is leaving a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Normal hangup.
    User,
    /// Fatal condition; the host keeps the call UI up to show the error.
    Error,
}

/// Trait for receiving events from the core.
/// Implementations must be Send + Sync (called from tokio tasks).
pub trait CallEventListener: Send + Sync {
    fn on_event(&self, event: CallEvent);
}

/// Internal event emitter that dispatches to registered listeners.
#[derive(Clone, Default)]
pub struct EventEmitter {
    listeners: Arc<RwLock<Vec<Arc<dyn CallEventListener>>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn CallEventListener>) {
        let mut listeners = match self.listeners.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(listener);
    }

    pub fn emit(&self, event: CallEvent) {
        let listeners = match self.listeners.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for listener in listeners.iter() {
            listener.on_event(event.clone());
        }
    }
}
