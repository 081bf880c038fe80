//! Slack redelivers an event when the first delivery was not acknowledged
//! within three seconds. Redeliveries caused by `http_timeout` are dropped so a
//! slow answer is posted once rather than once per retry.

use reqwest::header::HeaderMap;
use tracing::warn;

pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
pub const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";
pub const TIMEOUT_RETRY_REASON: &str = "http_timeout";
pub const RETRY_ACK_BODY: &str = "success";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    Continue,
    Acknowledge { retry_num: String, reason: String },
}

impl RetryDecision {
    pub fn evaluate(headers: &HeaderMap) -> Self {
        let Some(retry_num) = header_str(headers, RETRY_NUM_HEADER) else {
            return Self::Continue;
        };
        match header_str(headers, RETRY_REASON_HEADER) {
            Some(reason) if reason == TIMEOUT_RETRY_REASON => {
                warn!(
                    event_name = "ingress.slack.retry_dropped",
                    retry_num,
                    reason,
                    "acknowledging slack timeout retry without processing"
                );
                Self::Acknowledge { retry_num: retry_num.to_owned(), reason: reason.to_owned() }
            }
            _ => Self::Continue,
        }
    }

    pub fn should_skip(&self) -> bool {
        matches!(self, Self::Acknowledge { .. })
    }
}

// Non-UTF-8 values read as empty rather than absent: presence is what marks a retry.
fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).map(|value| value.to_str().unwrap_or_default())
}
