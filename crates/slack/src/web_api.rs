use std::time::Duration;

use async_trait::async_trait;
use pagebot_core::config::SlackConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const POST_MESSAGE_METHOD: &str = "chat.postMessage";
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub text: String,
    pub thread_ts: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlackApiError {
    #[error("slack web api transport failed: {0}")]
    Transport(String),
    #[error("slack web api returned http {0}")]
    Status(u16),
    #[error("slack web api call `{method}` failed: {code}")]
    Api { method: &'static str, code: String },
}

#[async_trait]
pub trait MessagePoster: Send + Sync {
    async fn post_message(&self, message: &OutboundMessage) -> Result<(), SlackApiError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

impl ApiResponse {
    fn into_result(self, method: &'static str) -> Result<(), SlackApiError> {
        if self.ok {
            return Ok(());
        }
        Err(SlackApiError::Api {
            method,
            code: self.error.unwrap_or_else(|| "unknown_error".to_owned()),
        })
    }
}

/// Bot-token client for the Slack Web API.
pub struct SlackWebClient {
    http: Client,
    api_base_url: String,
    bot_token: SecretString,
}

impl SlackWebClient {
    pub fn new(config: &SlackConfig) -> Result<Self, SlackApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;
        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_owned(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.api_base_url)
    }
}

#[async_trait]
impl MessagePoster for SlackWebClient {
    async fn post_message(&self, message: &OutboundMessage) -> Result<(), SlackApiError> {
        let response = self
            .http
            .post(self.method_url(POST_MESSAGE_METHOD))
            .bearer_auth(self.bot_token.expose_secret())
            .json(message)
            .send()
            .await
            .map_err(|error| SlackApiError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                event_name = "egress.slack.error_status",
                method = POST_MESSAGE_METHOD,
                status = status.as_u16(),
                "slack rejected web api call"
            );
            return Err(SlackApiError::Status(status.as_u16()));
        }

        let body: ApiResponse =
            response.json().await.map_err(|error| SlackApiError::Transport(error.to_string()))?;
        body.into_result(POST_MESSAGE_METHOD)?;

        debug!(
            event_name = "egress.slack.message_posted",
            channel = %message.channel,
            thread_id = %message.thread_ts,
            "posted reply"
        );
        Ok(())
    }
}
