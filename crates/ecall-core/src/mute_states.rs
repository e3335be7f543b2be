use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::devices::MediaDevices;
use crate::errors::CallError;
use crate::events::{CallEvent, EventEmitter, TrackKind};
use crate::url_params::UrlParams;

/// Mute state of one track kind.
///
/// Device availability and the user's preference are kept apart. Losing
/// every device forces the track off but leaves the preference alone, so a
/// device coming back restores whatever the user last chose.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteState {
    kind: TrackKind,
    available: bool,
    preference: bool,
    user_set: bool,
}

impl MuteState {
    fn new(kind: TrackKind, available: bool, enabled_by_default: bool) -> Self {
        Self {
            kind,
            available,
            preference: enabled_by_default,
            user_set: false,
        }
    }

    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn enabled(&self) -> bool {
        self.available && self.preference
    }

    /// The user can only toggle a track when a device for it exists.
    pub fn can_toggle(&self) -> bool {
        self.available
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<(), CallError> {
        if !self.available {
            return Err(CallError::DeviceUnavailable(self.kind));
        }
        self.preference = enabled;
        self.user_set = true;
        Ok(())
    }

    fn set_available(&mut self, available: bool) {
        if self.available != available {
            tracing::debug!(kind = ?self.kind, available, "input device availability changed");
        }
        self.available = available;
    }

    fn set_default(&mut self, enabled_by_default: bool) {
        if !self.user_set {
            self.preference = enabled_by_default;
        }
    }
}

/// Snapshot handed to UI shells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackMuteSnapshot {
    pub enabled: bool,
    pub can_toggle: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuteSnapshot {
    pub audio: TrackMuteSnapshot,
    pub video: TrackMuteSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteStates {
    audio: MuteState,
    video: MuteState,
    skip_lobby: bool,
}

impl MuteStates {
    pub fn new(devices: &MediaDevices, config: &Config, params: &UrlParams) -> Self {
        let skip_lobby = params.skip_lobby;
        let state = |kind: TrackKind| {
            MuteState::new(
                kind,
                devices.input(kind).is_available(),
                enabled_by_default(config, kind, skip_lobby),
            )
        };
        Self {
            audio: state(TrackKind::Audio),
            video: state(TrackKind::Video),
            skip_lobby,
        }
    }

    pub fn audio(&self) -> &MuteState {
        &self.audio
    }

    pub fn video(&self) -> &MuteState {
        &self.video
    }

    pub fn get(&self, kind: TrackKind) -> &MuteState {
        match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Video => &self.video,
        }
    }

    fn get_mut(&mut self, kind: TrackKind) -> &mut MuteState {
        match kind {
            TrackKind::Audio => &mut self.audio,
            TrackKind::Video => &mut self.video,
        }
    }

    pub fn snapshot(&self) -> MuteSnapshot {
        let snap = |s: &MuteState| TrackMuteSnapshot {
            enabled: s.enabled(),
            can_toggle: s.can_toggle(),
        };
        MuteSnapshot {
            audio: snap(&self.audio),
            video: snap(&self.video),
        }
    }

    /// Explicit user toggle. Fails when no input device of `kind` exists.
    pub fn set_enabled(&mut self, kind: TrackKind, enabled: bool) -> Result<(), CallError> {
        self.get_mut(kind).set_enabled(enabled)
    }

    /// Apply a new device snapshot; returns the kinds whose `enabled` flipped.
    pub fn on_devices_changed(&mut self, devices: &MediaDevices) -> Vec<(TrackKind, bool)> {
        self.update(|state| state.set_available(devices.input(state.kind).is_available()))
    }

    /// Apply new configuration defaults; returns the kinds whose `enabled` flipped.
    pub fn on_config_changed(&mut self, config: &Config) -> Vec<(TrackKind, bool)> {
        let skip_lobby = self.skip_lobby;
        self.update(|state| state.set_default(enabled_by_default(config, state.kind, skip_lobby)))
    }

    fn update(&mut self, mut apply: impl FnMut(&mut MuteState)) -> Vec<(TrackKind, bool)> {
        let mut changes = Vec::new();
        for state in [&mut self.audio, &mut self.video] {
            let before = state.enabled();
            apply(&mut *state);
            let after = state.enabled();
            if before != after {
                changes.push((state.kind, after));
            }
        }
        changes
    }
}

fn enabled_by_default(config: &Config, kind: TrackKind, skip_lobby: bool) -> bool {
    if skip_lobby {
        return false;
    }
    match kind {
        TrackKind::Audio => config.media_devices.enable_audio,
        TrackKind::Video => config.media_devices.enable_video,
    }
}

/// [`MuteStates`] kept current by a task watching device and config changes.
pub struct MuteStatesHandle {
    states: Arc<Mutex<MuteStates>>,
    emitter: EventEmitter,
    task: JoinHandle<()>,
}

impl MuteStatesHandle {
    pub fn spawn(
        mut devices: watch::Receiver<MediaDevices>,
        mut config: watch::Receiver<Config>,
        params: &UrlParams,
        emitter: EventEmitter,
    ) -> Self {
        let initial = {
            let d = devices.borrow_and_update().clone();
            let c = config.borrow_and_update().clone();
            MuteStates::new(&d, &c, params)
        };
        let states = Arc::new(Mutex::new(initial));

        let task_states = states.clone();
        let task_emitter = emitter.clone();
        let task = tokio::spawn(async move {
            let mut devices_open = true;
            let mut config_open = true;
            while devices_open || config_open {
                tokio::select! {
                    res = devices.changed(), if devices_open => {
                        if res.is_err() {
                            devices_open = false;
                            continue;
                        }
                        let snapshot = devices.borrow_and_update().clone();
                        let mut states = task_states.lock().await;
                        let changes = states.on_devices_changed(&snapshot);
                        emit_changes(&task_emitter, changes);
                    }
                    res = config.changed(), if config_open => {
                        if res.is_err() {
                            config_open = false;
                            continue;
                        }
                        let snapshot = config.borrow_and_update().clone();
                        let mut states = task_states.lock().await;
                        let changes = states.on_config_changed(&snapshot);
                        emit_changes(&task_emitter, changes);
                    }
                    else => break,
                }
            }
            tracing::debug!("mute state watcher ended");
        });

        Self { states, emitter, task }
    }

    pub async fn snapshot(&self) -> MuteSnapshot {
        self.states.lock().await.snapshot()
    }

    pub async fn set_enabled(&self, kind: TrackKind, enabled: bool) -> Result<(), CallError> {
        let mut states = self.states.lock().await;
        self.apply_user_choice(&mut states, kind, enabled)
    }

    /// Flip the current state of `kind`, returning the new value.
    pub async fn toggle(&self, kind: TrackKind) -> Result<bool, CallError> {
        let mut states = self.states.lock().await;
        let enabled = !states.get(kind).enabled();
        self.apply_user_choice(&mut states, kind, enabled)?;
        Ok(enabled)
    }

    // Callers hold the states lock, so events leave in the order changes land.
    fn apply_user_choice(&self, states: &mut MuteStates, kind: TrackKind, enabled: bool) -> Result<(), CallError> {
        let before = states.get(kind).enabled();
        states.set_enabled(kind, enabled)?;
        tracing::info!(?kind, enabled, "mute state set by user");
        if before != enabled {
            self.emitter.emit(CallEvent::MuteStateChanged { kind, enabled });
        }
        Ok(())
    }
}

fn emit_changes(emitter: &EventEmitter, changes: Vec<(TrackKind, bool)>) {
    for (kind, enabled) in changes {
        emitter.emit(CallEvent::MuteStateChanged { kind, enabled });
    }
}

impl Drop for MuteStatesHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
