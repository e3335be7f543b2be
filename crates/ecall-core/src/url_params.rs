use std::collections::HashMap;

use url::Url;

use crate::errors::CallError;

/// Parameters the call page is opened with.
///
/// Values are read from the query string and from the query part of the
/// fragment (`#/room?skipLobby=true`); the query string wins on conflict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UrlParams {
    /// Skip the pre-call lobby; media starts muted.
    pub skip_lobby: bool,
    /// After a user hangup the host shows the lobby instead of closing.
    pub return_to_lobby: bool,
    /// Set when embedded as a widget.
    pub widget_id: Option<String>,
    /// Origin of the embedding host.
    pub parent_url: Option<String>,
}

impl UrlParams {
    pub fn parse(input: &str) -> Result<Self, CallError> {
        let url = Url::parse(input).map_err(|e| CallError::Config(format!("invalid url: {e}")))?;
        Ok(Self::from_url(&url))
    }

    pub fn from_url(url: &Url) -> Self {
        let mut params: HashMap<String, String> = HashMap::new();
        if let Some(fragment_query) = url.fragment().and_then(|f| f.split_once('?').map(|(_, q)| q)) {
            params.extend(url::form_urlencoded::parse(fragment_query.as_bytes()).into_owned());
        }
        params.extend(url.query_pairs().into_owned());

        Self {
            skip_lobby: flag(&params, "skipLobby"),
            return_to_lobby: flag(&params, "returnToLobby"),
            widget_id: params.get("widgetId").cloned(),
            parent_url: params.get("parentUrl").cloned(),
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.widget_id.is_some() && self.parent_url.is_some()
    }
}

// Present and not literally "false".
fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params.get(name).is_some_and(|v| v != "false")
}
