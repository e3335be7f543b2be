//! Call session core.
//!
//! Chooses the LiveKit focus for a Matrix RTC call, joins and leaves the
//! session while keeping an embedding widget host informed, tracks the SFU
//! connection and derives local mute state from the available devices.

pub mod config;
pub mod connection;
pub mod devices;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod focus;
pub mod logging;
pub mod mute_states;
pub mod session;
pub mod sfu;
pub mod url_params;
pub mod widget;

pub use config::{Config, ConfigStore};
pub use connection::ConnectionTracker;
pub use devices::{DeviceInfo, MediaDevice, MediaDevices};
pub use discovery::{ClientConfigSource, WellKnownClient};
pub use errors::CallError;
pub use events::{CallEvent, CallEventListener, EcConnectionState, EventEmitter, LeaveReason, TrackKind};
pub use focus::{CallMembership, Focus, LivekitFocus, LivekitFocusActive, resolve_preferred_foci};
pub use logging::init_logging;
pub use mute_states::{MuteSnapshot, MuteStates, MuteStatesHandle};
pub use session::{JoinOptions, RtcSession, RtcSessionHelper};
pub use sfu::{ConnectFailure, LiveKitConnector, SfuConfig, SfuConnector};
pub use url_params::UrlParams;
pub use widget::{PostMessageTransport, WidgetAction, WidgetTransport};
