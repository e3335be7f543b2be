use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::errors::CallError;
use crate::url_params::UrlParams;

const FROM_WIDGET: &str = "fromWidget";
const REPLY_TIMEOUT_SECS: u64 = 10;

/// Call lifecycle actions understood by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetAction {
    JoinCall,
    HangupCall,
    Close,
}

impl WidgetAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetAction::JoinCall => "io.element.join",
            WidgetAction::HangupCall => "im.vector.hangup",
            WidgetAction::Close => "io.element.close",
        }
    }
}

#[async_trait]
pub trait WidgetTransport: Send + Sync {
    /// Send `action` to the host and wait for its reply.
    async fn send(&self, action: WidgetAction, data: Value) -> Result<Value, CallError>;
}

/// Envelope of a widget API message.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetMessage {
    pub api: String,
    pub widget_id: String,
    pub request_id: String,
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

type PendingReplies = HashMap<String, oneshot::Sender<Value>>;

/// Serializes `fromWidget` requests onto an outbound channel (the host's
/// postMessage bridge) and matches replies fed back through
/// [`PostMessageTransport::handle_incoming`].
pub struct PostMessageTransport {
    widget_id: String,
    outbound: mpsc::UnboundedSender<String>,
    pending: Arc<Mutex<PendingReplies>>,
    reply_timeout: Duration,
}

impl PostMessageTransport {
    pub fn new(widget_id: impl Into<String>, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            widget_id: widget_id.into(),
            outbound,
            pending: Arc::new(Mutex::new(HashMap::new())),
            reply_timeout: Duration::from_secs(REPLY_TIMEOUT_SECS),
        }
    }

    /// Only embedded pages get a transport.
    pub fn from_url_params(params: &UrlParams, outbound: mpsc::UnboundedSender<String>) -> Option<Self> {
        if !params.is_embedded() {
            return None;
        }
        let widget_id = params.widget_id.clone()?;
        Some(Self::new(widget_id, outbound))
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }

    /// Feed a raw message received from the host.
    ///
    /// Returns `true` when it answered one of our pending requests.
    pub fn handle_incoming(&self, raw: &str) -> Result<bool, CallError> {
        let msg: WidgetMessage = serde_json::from_str(raw)
            .map_err(|e| CallError::Widget(format!("malformed message: {e}")))?;
        if msg.api != FROM_WIDGET || msg.widget_id != self.widget_id {
            return Ok(false);
        }
        let Some(response) = msg.response else {
            return Ok(false);
        };
        match self.pending().remove(&msg.request_id) {
            Some(reply) => {
                let _ = reply.send(response);
                Ok(true)
            }
            None => {
                tracing::debug!(request_id = %msg.request_id, "reply for unknown widget request");
                Ok(false)
            }
        }
    }

    fn pending(&self) -> MutexGuard<'_, PendingReplies> {
        match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl WidgetTransport for PostMessageTransport {
    async fn send(&self, action: WidgetAction, data: Value) -> Result<Value, CallError> {
        let request_id = uuid::Uuid::new_v4().to_string();
        let msg = WidgetMessage {
            api: FROM_WIDGET.to_string(),
            widget_id: self.widget_id.clone(),
            request_id: request_id.clone(),
            action: action.as_str().to_string(),
            data,
            response: None,
        };
        let raw = serde_json::to_string(&msg).map_err(|e| CallError::Widget(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending().insert(request_id.clone(), tx);

        tracing::debug!(action = action.as_str(), %request_id, "sending widget action");
        if self.outbound.send(raw).is_err() {
            self.pending().remove(&request_id);
            return Err(CallError::Widget("host channel closed".into()));
        }

        match tokio::time::timeout(self.reply_timeout, rx).await {
            Ok(Ok(response)) => match response.get("error") {
                Some(error) => Err(CallError::Widget(format!(
                    "host rejected {}: {error}",
                    action.as_str()
                ))),
                None => Ok(response),
            },
            Ok(Err(_)) => Err(CallError::Widget("reply channel dropped".into())),
            Err(_) => {
                self.pending().remove(&request_id);
                Err(CallError::Widget(format!(
                    "timed out waiting for reply to {}",
                    action.as_str()
                )))
            }
        }
    }
}
