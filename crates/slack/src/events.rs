use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use pagebot_core::ApplicationError;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::web_api::{OutboundMessage, SlackApiError};

/// Top-level body Slack sends to the Events API request URL.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlackPayload {
    UrlVerification {
        challenge: String,
    },
    EventCallback(EventCallback),
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct EventCallback {
    pub event_id: String,
    #[serde(default)]
    pub api_app_id: Option<String>,
    #[serde(default)]
    pub authorizations: Vec<Authorization>,
    pub event: Value,
}

/// Installation the event was delivered for; `user_id` is the bot user.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("request body is not a valid events api payload: {0}")]
    Body(#[source] serde_json::Error),
    #[error("`{event_type}` event is malformed: {source}")]
    Event {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("event is missing its `type` field")]
    MissingEventType,
}

pub fn parse_payload(body: &[u8]) -> Result<SlackPayload, PayloadError> {
    serde_json::from_slice(body).map_err(PayloadError::Body)
}

impl EventCallback {
    pub fn into_envelope(self) -> Result<SlackEnvelope, PayloadError> {
        let event = SlackEvent::from_value(self.event)?;
        let receiver = BotIdentity {
            app_id: self.api_app_id,
            user_id: self.authorizations.into_iter().next().and_then(|auth| auth.user_id),
        };
        Ok(SlackEnvelope { envelope_id: self.event_id, receiver, event })
    }
}

/// The app and bot user an event was delivered to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BotIdentity {
    pub app_id: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub receiver: BotIdentity,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(AppMentionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let event_type = value
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(PayloadError::MissingEventType)?;

        match event_type.as_str() {
            "app_mention" => serde_json::from_value(value)
                .map(Self::AppMention)
                .map_err(|source| PayloadError::Event { event_type, source }),
            _ => Ok(Self::Unsupported { event_type }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AppMentionEvent {
    pub channel: String,
    pub ts: String,
    pub text: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub bot_profile: Option<BotProfile>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BotProfile {
    #[serde(default)]
    pub app_id: Option<String>,
}

impl AppMentionEvent {
    /// Thread to reply into: the parent thread when the mention is a reply,
    /// otherwise the mention itself starts the thread.
    pub fn reply_thread_ts(&self) -> &str {
        self.thread_ts.as_deref().filter(|ts| !ts.is_empty()).unwrap_or(&self.ts)
    }

    /// True when the mention was posted by the receiving bot itself. Mentions
    /// from other bots and workflows are not self-authored.
    pub fn is_authored_by(&self, receiver: &BotIdentity) -> bool {
        let same_user = matches!(
            (&self.user, &receiver.user_id),
            (Some(author), Some(bot_user)) if author == bot_user
        );
        let author_app = self.bot_profile.as_ref().and_then(|profile| profile.app_id.as_ref());
        let same_app = matches!(
            (author_app, &receiver.app_id),
            (Some(author_app), Some(app)) if author_app == app
        );
        same_user || same_app
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Replied(OutboundMessage),
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Answer(#[from] ApplicationError),
    #[error(transparent)]
    Post(#[from] SlackApiError),
}

impl EventHandlerError {
    pub fn into_application(self) -> ApplicationError {
        match self {
            Self::Answer(error) => error,
            Self::Post(error) => ApplicationError::Integration(error.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> SlackEventType;
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<SlackEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}
