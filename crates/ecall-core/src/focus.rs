use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Config;
use crate::discovery::ClientConfigSource;
use crate::errors::CallError;
use crate::session::RtcSession;

/// Key of the foci list in a client well-known document.
pub const FOCI_WELL_KNOWN_KEY: &str = "org.matrix.msc4143.rtc_foci";

const LIVEKIT_FOCUS_TYPE: &str = "livekit";

/// A candidate media routing endpoint.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "Value", into = "Value")]
pub enum Focus {
    Livekit(LivekitFocus),
    /// Any focus type this client cannot use, kept as received.
    Other(Value),
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LivekitFocus {
    #[serde(rename = "livekit_service_url")]
    pub service_url: String,
    #[serde(rename = "livekit_alias", default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Focus {
    pub fn livekit(service_url: impl Into<String>, alias: Option<&str>) -> Self {
        Focus::Livekit(LivekitFocus {
            service_url: service_url.into(),
            alias: alias.map(str::to_string),
        })
    }

    pub fn is_livekit(&self) -> bool {
        matches!(self, Focus::Livekit(_))
    }
}

impl TryFrom<Value> for Focus {
    type Error = serde_json::Error;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        if value.get("type").and_then(Value::as_str) == Some(LIVEKIT_FOCUS_TYPE) {
            serde_json::from_value(value).map(Focus::Livekit)
        } else {
            Ok(Focus::Other(value))
        }
    }
}

impl From<Focus> for Value {
    fn from(focus: Focus) -> Self {
        match focus {
            Focus::Livekit(f) => {
                let mut obj = serde_json::Map::new();
                obj.insert("type".into(), LIVEKIT_FOCUS_TYPE.into());
                obj.insert("livekit_service_url".into(), f.service_url.into());
                if let Some(alias) = f.alias {
                    obj.insert("livekit_alias".into(), alias.into());
                }
                Value::Object(obj)
            }
            Focus::Other(value) => value,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusSelection {
    #[serde(rename = "oldest_membership")]
    OldestMembership,
}

/// How members agree on the focus actually used for the call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LivekitFocusActive {
    #[serde(rename = "type")]
    pub focus_type: String,
    pub focus_selection: FocusSelection,
}

impl LivekitFocusActive {
    /// The oldest membership's focus wins.
    pub fn oldest_membership() -> Self {
        Self {
            focus_type: "livekit".to_string(),
            focus_selection: FocusSelection::OldestMembership,
        }
    }
}

/// A prior participant's call membership, as published in room state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CallMembership {
    pub sender: String,
    pub device_id: String,
    #[serde(default)]
    pub foci_preferred: Vec<Focus>,
}

impl CallMembership {
    pub fn preferred_foci(&self) -> &[Focus] {
        &self.foci_preferred
    }
}

/// Build the ordered list of foci to try when joining `session`.
///
/// Order: the focus already in use, the oldest membership's preferred foci,
/// foci advertised in the local domain's well-known document, then the
/// configured fallback. Membership foci are only listed once; discovery and
/// config entries are appended as they come.
pub async fn resolve_preferred_foci(
    session: &dyn RtcSession,
    discovery: &dyn ClientConfigSource,
    config: &Config,
) -> Result<Vec<Focus>, CallError> {
    let room_id = session.room_id();
    let mut foci: Vec<Focus> = Vec::new();

    let in_use = session.focus_in_use();
    let preferred = session
        .oldest_membership()
        .map(|m| m.foci_preferred)
        .unwrap_or_default();
    for focus in in_use.into_iter().chain(preferred) {
        if focus.is_livekit() && !foci.contains(&focus) {
            foci.push(focus);
        }
    }

    let domain = session.local_domain();
    match &domain {
        Some(domain) => foci.extend(discover_foci(discovery, domain, room_id).await),
        None => tracing::debug!("no local domain, skipping focus discovery"),
    }

    if let Some(url) = &config.livekit.livekit_service_url {
        foci.push(Focus::livekit(url.clone(), Some(room_id)));
    }

    if foci.is_empty() {
        return Err(CallError::FocusMissing { domain });
    }
    tracing::info!(count = foci.len(), room_id, "resolved preferred foci");
    Ok(foci)
}

/// Best-effort well-known lookup; any failure yields no foci.
async fn discover_foci(discovery: &dyn ClientConfigSource, domain: &str, room_id: &str) -> Vec<Focus> {
    match discovery.raw_client_config(domain).await {
        Ok(doc) => foci_from_well_known(&doc, room_id),
        Err(e) => {
            tracing::warn!("focus discovery for {domain} failed: {e}");
            Vec::new()
        }
    }
}

/// Extract LiveKit foci from a well-known document, aliased to `room_id`
/// unless the entry names its own alias.
pub fn foci_from_well_known(doc: &Value, room_id: &str) -> Vec<Focus> {
    let Some(entries) = doc.get(FOCI_WELL_KNOWN_KEY).and_then(Value::as_array) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            if entry.get("type").and_then(Value::as_str) != Some(LIVEKIT_FOCUS_TYPE) {
                return None;
            }
            let url = entry.get("livekit_service_url")?.as_str()?;
            let alias = entry
                .get("livekit_alias")
                .and_then(Value::as_str)
                .unwrap_or(room_id);
            Some(Focus::livekit(url, Some(alias)))
        })
        .collect()
}
