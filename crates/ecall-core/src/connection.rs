use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::errors::CallError;
use crate::events::{CallEvent, EcConnectionState, EventEmitter};
use crate::sfu::{SfuConfig, SfuConnector, SfuEvent};

/// Follows the SFU connection as the chosen focus changes.
///
/// Applying a different [`SfuConfig`] while connected moves through
/// `SwitchingFocus` rather than `Disconnected`, so the UI can keep the call
/// on screen during the hop.
pub struct ConnectionTracker {
    connector: Arc<dyn SfuConnector>,
    emitter: EventEmitter,
    state: Arc<Mutex<EcConnectionState>>,
    current: Arc<Mutex<Option<SfuConfig>>>,
    events_task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionTracker {
    pub fn new(connector: Arc<dyn SfuConnector>, emitter: EventEmitter) -> Self {
        Self {
            connector,
            emitter,
            state: Arc::new(Mutex::new(EcConnectionState::Disconnected)),
            current: Arc::new(Mutex::new(None)),
            events_task: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> EcConnectionState {
        *self.state.lock().await
    }

    /// Connect to, switch to, or disconnect from the given SFU.
    ///
    /// Capacity rejections surface as `CallError::InsufficientCapacity`.
    pub async fn apply_sfu_config(&self, config: Option<SfuConfig>) -> Result<(), CallError> {
        let mut current = self.current.lock().await;
        if *current == config {
            return Ok(());
        }

        match (current.take(), config) {
            (None, None) => Ok(()),
            (Some(_), None) => {
                self.stop_events().await;
                self.connector.disconnect().await;
                self.set_state(EcConnectionState::Disconnected).await;
                Ok(())
            }
            (None, Some(next)) => {
                self.connect(&next, EcConnectionState::Connecting).await?;
                *current = Some(next);
                Ok(())
            }
            (Some(previous), Some(next)) => {
                tracing::info!(from = %previous.url, to = %next.url, "switching focus");
                self.set_state(EcConnectionState::SwitchingFocus).await;
                self.stop_events().await;
                self.connector.disconnect().await;
                self.connect(&next, EcConnectionState::SwitchingFocus).await?;
                *current = Some(next);
                Ok(())
            }
        }
    }

    async fn connect(&self, config: &SfuConfig, pending: EcConnectionState) -> Result<(), CallError> {
        self.set_state(pending).await;
        match self.connector.connect(config).await {
            Ok(events) => {
                self.set_state(EcConnectionState::Connected).await;
                let task = tokio::spawn(Self::event_loop(
                    events,
                    self.state.clone(),
                    self.current.clone(),
                    self.emitter.clone(),
                ));
                *self.events_task.lock().await = Some(task);
                Ok(())
            }
            Err(failure) => {
                tracing::warn!(url = %config.url, "sfu connection failed: {failure}");
                self.set_state(EcConnectionState::Disconnected).await;
                Err(failure.into())
            }
        }
    }

    async fn stop_events(&self) {
        if let Some(task) = self.events_task.lock().await.take() {
            task.abort();
        }
    }

    async fn set_state(&self, next: EcConnectionState) {
        Self::update_state(&self.state, &self.emitter, next).await;
    }

    async fn update_state(state: &Mutex<EcConnectionState>, emitter: &EventEmitter, next: EcConnectionState) {
        let mut state = state.lock().await;
        if *state != next {
            *state = next;
            emitter.emit(CallEvent::ConnectionStateChanged(next));
        }
    }

    async fn event_loop(
        mut events: mpsc::UnboundedReceiver<SfuEvent>,
        state: Arc<Mutex<EcConnectionState>>,
        current: Arc<Mutex<Option<SfuConfig>>>,
        emitter: EventEmitter,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                SfuEvent::Reconnecting => {
                    Self::update_state(&state, &emitter, EcConnectionState::Reconnecting).await;
                }
                SfuEvent::Reconnected => {
                    Self::update_state(&state, &emitter, EcConnectionState::Connected).await;
                }
                SfuEvent::Disconnected { reason } => {
                    tracing::info!("sfu disconnected: {reason}");
                    *current.lock().await = None;
                    Self::update_state(&state, &emitter, EcConnectionState::Disconnected).await;
                    break;
                }
            }
        }
    }
}

impl Drop for ConnectionTracker {
    fn drop(&mut self) {
        if let Some(task) = self.events_task.get_mut().take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::ChannelListener;
    use crate::sfu::{ConnectFailure, ConnectFailureReason};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connect(String),
        Disconnect,
    }

    /// Connector double: fails for configured URLs, otherwise hands out an
    /// event channel the test can drive.
    #[derive(Default)]
    struct MockConnector {
        failures: HashMap<String, ConnectFailure>,
        calls: StdMutex<Vec<Call>>,
        senders: StdMutex<Vec<mpsc::UnboundedSender<SfuEvent>>>,
    }

    impl MockConnector {
        fn failing(url: &str, failure: ConnectFailure) -> Self {
            Self {
                failures: HashMap::from([(url.to_string(), failure)]),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn last_sender(&self) -> mpsc::UnboundedSender<SfuEvent> {
            self.senders.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl SfuConnector for MockConnector {
        async fn connect(&self, config: &SfuConfig) -> Result<mpsc::UnboundedReceiver<SfuEvent>, ConnectFailure> {
            self.calls.lock().unwrap().push(Call::Connect(config.url.clone()));
            if let Some(failure) = self.failures.get(&config.url) {
                return Err(failure.clone());
            }
            let (tx, rx) = mpsc::unbounded_channel();
            self.senders.lock().unwrap().push(tx);
            Ok(rx)
        }

        async fn disconnect(&self) {
            self.calls.lock().unwrap().push(Call::Disconnect);
        }
    }

    fn sfu(url: &str) -> SfuConfig {
        SfuConfig {
            url: url.to_string(),
            jwt: "JWT token".to_string(),
        }
    }

    fn tracker(connector: Arc<MockConnector>) -> (ConnectionTracker, mpsc::UnboundedReceiver<CallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let emitter = EventEmitter::new();
        emitter.add_listener(Arc::new(ChannelListener(tx)));
        (ConnectionTracker::new(connector, emitter), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<CallEvent>) -> Vec<EcConnectionState> {
        let mut states = Vec::new();
        while let Ok(CallEvent::ConnectionStateChanged(s)) = rx.try_recv() {
            states.push(s);
        }
        states
    }

    #[tokio::test]
    async fn track_limit_errors_are_insufficient_capacity() {
        for failure in [
            ConnectFailure::new(ConnectFailureReason::InternalError, Some(503), ""),
            ConnectFailure::new(ConnectFailureReason::NotAllowed, Some(429), ""),
        ] {
            let connector = Arc::new(MockConnector::failing("URL", failure));
            let (tracker, mut rx) = tracker(connector);

            let err = tracker.apply_sfu_config(Some(sfu("URL"))).await.unwrap_err();

            assert!(matches!(err, CallError::InsufficientCapacity));
            assert_eq!(err.translation_key(), "error.insufficient_capacity");
            assert_eq!(tracker.state().await, EcConnectionState::Disconnected);
            assert_eq!(
                drain(&mut rx),
                vec![EcConnectionState::Connecting, EcConnectionState::Disconnected]
            );
        }
    }

    #[tokio::test]
    async fn failed_connect_can_be_retried() {
        let failure = ConnectFailure::new(ConnectFailureReason::ServerUnreachable, None, "timed out");
        let connector = Arc::new(MockConnector::failing("URL", failure));
        let (tracker, _rx) = tracker(connector.clone());

        assert!(matches!(
            tracker.apply_sfu_config(Some(sfu("URL"))).await,
            Err(CallError::Connection(_))
        ));
        let _ = tracker.apply_sfu_config(Some(sfu("URL"))).await;

        assert_eq!(
            connector.calls(),
            vec![Call::Connect("URL".into()), Call::Connect("URL".into())]
        );
    }

    #[tokio::test]
    async fn switching_focus_reconnects() {
        let connector = Arc::new(MockConnector::default());
        let (tracker, mut rx) = tracker(connector.clone());

        tracker.apply_sfu_config(Some(sfu("wss://a"))).await.unwrap();
        tracker.apply_sfu_config(Some(sfu("wss://a"))).await.unwrap();
        tracker.apply_sfu_config(Some(sfu("wss://b"))).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                EcConnectionState::Connecting,
                EcConnectionState::Connected,
                EcConnectionState::SwitchingFocus,
                EcConnectionState::Connected,
            ]
        );
        assert_eq!(
            connector.calls(),
            vec![
                Call::Connect("wss://a".into()),
                Call::Disconnect,
                Call::Connect("wss://b".into()),
            ]
        );
    }

    #[tokio::test]
    async fn clearing_config_disconnects() {
        let connector = Arc::new(MockConnector::default());
        let (tracker, _rx) = tracker(connector.clone());

        tracker.apply_sfu_config(None).await.unwrap();
        tracker.apply_sfu_config(Some(sfu("wss://a"))).await.unwrap();
        tracker.apply_sfu_config(None).await.unwrap();

        assert_eq!(tracker.state().await, EcConnectionState::Disconnected);
        assert_eq!(connector.calls(), vec![Call::Connect("wss://a".into()), Call::Disconnect]);
    }

    #[tokio::test]
    async fn follows_sfu_events() {
        let connector = Arc::new(MockConnector::default());
        let (tracker, mut rx) = tracker(connector.clone());
        tracker.apply_sfu_config(Some(sfu("wss://a"))).await.unwrap();
        drain(&mut rx);

        let events = connector.last_sender();
        events.send(SfuEvent::Reconnecting).unwrap();
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::ConnectionStateChanged(EcConnectionState::Reconnecting))
        );
        events.send(SfuEvent::Reconnected).unwrap();
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::ConnectionStateChanged(EcConnectionState::Connected))
        );
        events
            .send(SfuEvent::Disconnected { reason: "ServerShutdown".into() })
            .unwrap();
        assert_eq!(
            rx.recv().await,
            Some(CallEvent::ConnectionStateChanged(EcConnectionState::Disconnected))
        );

        // The same config connects again once the server dropped us.
        tracker.apply_sfu_config(Some(sfu("wss://a"))).await.unwrap();
        assert_eq!(tracker.state().await, EcConnectionState::Connected);
        assert_eq!(
            connector.calls(),
            vec![Call::Connect("wss://a".into()), Call::Connect("wss://a".into())]
        );
    }
}
