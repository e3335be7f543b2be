use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;

use crate::config::ConfigStore;
use crate::discovery::ClientConfigSource;
use crate::errors::CallError;
use crate::events::{CallEvent, EventEmitter, LeaveReason};
use crate::focus::{CallMembership, Focus, LivekitFocusActive, resolve_preferred_foci};
use crate::url_params::UrlParams;
use crate::widget::{WidgetAction, WidgetTransport};

/// Options passed along with a join.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct JoinOptions {
    pub manage_media_keys: bool,
    pub use_legacy_member_events: bool,
}

/// A Matrix RTC session for one room.
#[async_trait]
pub trait RtcSession: Send + Sync {
    fn room_id(&self) -> &str;

    /// Server name of the local user, if known.
    fn local_domain(&self) -> Option<String>;

    /// Focus the oldest membership is currently using.
    fn focus_in_use(&self) -> Option<Focus>;

    fn oldest_membership(&self) -> Option<CallMembership>;

    async fn join_room_session(
        &self,
        foci: Vec<Focus>,
        active: LivekitFocusActive,
        options: JoinOptions,
    ) -> Result<(), CallError>;

    /// Returns whether the membership was actually removed.
    async fn leave_room_session(&self) -> Result<bool, CallError>;
}

/// Joins and leaves RTC sessions, keeping the widget host informed.
pub struct RtcSessionHelper {
    config: Arc<ConfigStore>,
    discovery: Arc<dyn ClientConfigSource>,
    widget: Option<Arc<dyn WidgetTransport>>,
    params: UrlParams,
    emitter: EventEmitter,
    teardown: watch::Sender<bool>,
}

impl RtcSessionHelper {
    pub fn new(
        config: Arc<ConfigStore>,
        discovery: Arc<dyn ClientConfigSource>,
        widget: Option<Arc<dyn WidgetTransport>>,
        params: UrlParams,
        emitter: EventEmitter,
    ) -> Self {
        let (teardown, _) = watch::channel(false);
        Self {
            config,
            discovery,
            widget,
            params,
            emitter,
            teardown,
        }
    }

    /// Resolve foci for `session` and join it.
    ///
    /// Join failures are returned unchanged. If [`teardown`](Self::teardown)
    /// fires while foci are still being resolved, the join is skipped and
    /// `CallError::Cancelled` is returned.
    pub async fn enter_rtc_session(
        &self,
        session: &dyn RtcSession,
        manage_media_keys: bool,
    ) -> Result<(), CallError> {
        let mut teardown = self.teardown.subscribe();
        if *teardown.borrow_and_update() {
            return Err(CallError::Cancelled);
        }

        let config = self.config.get();
        let foci = tokio::select! {
            foci = resolve_preferred_foci(session, self.discovery.as_ref(), &config) => foci?,
            _ = teardown.changed() => {
                tracing::info!(room_id = session.room_id(), "teardown during focus resolution, not joining");
                return Err(CallError::Cancelled);
            }
        };

        let options = JoinOptions {
            manage_media_keys,
            use_legacy_member_events: false,
        };
        session
            .join_room_session(foci, LivekitFocusActive::oldest_membership(), options)
            .await?;
        tracing::info!(room_id = session.room_id(), "joined rtc session");
        self.emitter.emit(CallEvent::SessionJoined {
            room_id: session.room_id().to_string(),
        });

        if let Some(widget) = &self.widget {
            if let Err(e) = widget.send(WidgetAction::JoinCall, json!({})).await {
                tracing::warn!("failed to notify widget host of join: {e}");
            }
        }
        Ok(())
    }

    /// Leave `session`, then tell the host to hang up and, for a normal
    /// hangup, to close the call UI.
    pub async fn leave_rtc_session(
        &self,
        session: &dyn RtcSession,
        reason: LeaveReason,
    ) -> Result<(), CallError> {
        session.leave_room_session().await?;
        tracing::info!(?reason, "left rtc session");
        self.emitter.emit(CallEvent::SessionLeft { reason });

        let Some(widget) = &self.widget else {
            return Ok(());
        };
        self.notify_widget(widget.as_ref(), WidgetAction::HangupCall).await;
        let close = reason == LeaveReason::User && !self.params.return_to_lobby;
        if close {
            self.notify_widget(widget.as_ref(), WidgetAction::Close).await;
        }
        Ok(())
    }

    /// Abandon any in-flight [`enter_rtc_session`](Self::enter_rtc_session).
    pub fn teardown(&self) {
        self.teardown.send_replace(true);
    }

    async fn notify_widget(&self, widget: &dyn WidgetTransport, action: WidgetAction) {
        if let Err(e) = widget.send(action, json!({})).await {
            tracing::warn!(action = action.as_str(), "widget notification failed: {e}");
        }
    }
}
