use crate::events::TrackKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub device_id: String,
    pub label: String,
    pub group_id: String,
}

/// One class of media device (microphones, speakers or cameras).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDevice {
    pub available: Vec<DeviceInfo>,
    pub selected_id: Option<String>,
}

impl MediaDevice {
    pub fn new(available: Vec<DeviceInfo>) -> Self {
        let selected_id = available.first().map(|d| d.device_id.clone());
        Self { available, selected_id }
    }

    pub fn is_available(&self) -> bool {
        !self.available.is_empty()
    }
}

/// Snapshot of the devices the platform currently exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaDevices {
    pub audio_input: MediaDevice,
    pub audio_output: MediaDevice,
    pub video_input: MediaDevice,
}

impl MediaDevices {
    /// Input devices backing a local track of `kind`.
    pub fn input(&self, kind: TrackKind) -> &MediaDevice {
        match kind {
            TrackKind::Audio => &self.audio_input,
            TrackKind::Video => &self.video_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> DeviceInfo {
        DeviceInfo {
            device_id: id.to_string(),
            label: format!("{id} label"),
            group_id: String::new(),
        }
    }

    #[test]
    fn new_selects_first_device() {
        let d = MediaDevice::new(vec![device("mic-1"), device("mic-2")]);
        assert_eq!(d.selected_id.as_deref(), Some("mic-1"));
        assert!(d.is_available());
    }

    #[test]
    fn input_maps_track_kind() {
        let devices = MediaDevices {
            audio_input: MediaDevice::new(vec![device("mic")]),
            audio_output: MediaDevice::new(vec![device("speaker")]),
            video_input: MediaDevice::default(),
        };
        assert!(devices.input(TrackKind::Audio).is_available());
        assert!(!devices.input(TrackKind::Video).is_available());
    }
}
