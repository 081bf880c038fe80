//! Slack Events API request URL.
//!
//! - `POST /slack/events` - verify signature, drop timeout retries, answer
//!   `url_verification`, dispatch `event_callback` and reply once the handler
//!   has finished.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use pagebot_core::ApplicationError;
use pagebot_slack::{
    events::{parse_payload, DispatchError, EventContext, EventDispatcher, SlackPayload},
    retry::{RetryDecision, RETRY_ACK_BODY},
    signature::SignatureVerifier,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const EVENTS_PATH: &str = "/slack/events";

#[derive(Clone)]
pub struct WebhookState {
    verifier: SignatureVerifier,
    dispatcher: Arc<EventDispatcher>,
}

impl WebhookState {
    pub fn new(verifier: SignatureVerifier, dispatcher: EventDispatcher) -> Self {
        Self { verifier, dispatcher: Arc::new(dispatcher) }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookError {
    pub error: String,
    pub correlation_id: String,
}

pub fn router(state: WebhookState) -> Router {
    Router::new().route(EVENTS_PATH, post(slack_events)).with_state(state)
}

pub async fn slack_events(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(error) = state.verifier.verify(&headers, &body) {
        let correlation_id = request_correlation_id();
        warn!(
            event_name = "ingress.slack.signature_rejected",
            correlation_id = %correlation_id,
            error = %error,
            "rejected slack request with invalid signature"
        );
        return failure(StatusCode::UNAUTHORIZED, "invalid request signature", &correlation_id);
    }

    if RetryDecision::evaluate(&headers).should_skip() {
        return (StatusCode::OK, RETRY_ACK_BODY).into_response();
    }

    let payload = match parse_payload(&body) {
        Ok(payload) => payload,
        Err(error) => {
            return bad_request(
                ApplicationError::InvalidInput(error.to_string()),
                &request_correlation_id(),
            )
        }
    };

    let callback = match payload {
        SlackPayload::UrlVerification { challenge } => {
            info!(
                event_name = "ingress.slack.url_verification",
                correlation_id = "url_verification",
                "answered url verification challenge"
            );
            return (StatusCode::OK, challenge).into_response();
        }
        SlackPayload::EventCallback(callback) => callback,
        SlackPayload::Other => return StatusCode::OK.into_response(),
    };

    let ctx = EventContext { correlation_id: callback.event_id.clone() };
    let envelope = match callback.into_envelope() {
        Ok(envelope) => envelope,
        Err(error) => {
            return bad_request(
                ApplicationError::InvalidInput(error.to_string()),
                &ctx.correlation_id,
            )
        }
    };

    match state.dispatcher.dispatch(&envelope, &ctx).await {
        Ok(result) => {
            debug!(
                event_name = "ingress.slack.dispatched",
                correlation_id = %ctx.correlation_id,
                result = ?result,
                "slack event handled"
            );
            StatusCode::OK.into_response()
        }
        Err(DispatchError::Handler(handler_error)) => {
            let interface =
                handler_error.into_application().into_interface(ctx.correlation_id.clone());
            error!(
                event_name = "ingress.slack.handler_failed",
                correlation_id = %ctx.correlation_id,
                error = %interface,
                "slack event handler failed"
            );
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                interface.user_message(),
                interface.correlation_id(),
            )
        }
    }
}

fn bad_request(error: ApplicationError, correlation_id: &str) -> Response {
    let interface = error.into_interface(correlation_id);
    warn!(
        event_name = "ingress.slack.malformed_event",
        correlation_id = %correlation_id,
        error = %interface,
        "rejected malformed slack payload"
    );
    failure(StatusCode::BAD_REQUEST, interface.user_message(), correlation_id)
}

// Requests without an `event_id` still get an id to join logs and responses.
fn request_correlation_id() -> String {
    format!("req-{}", Uuid::new_v4().simple())
}

fn failure(status: StatusCode, message: &str, correlation_id: &str) -> Response {
    let body =
        WebhookError { error: message.to_string(), correlation_id: correlation_id.to_string() };
    (status, Json(body)).into_response()
}
