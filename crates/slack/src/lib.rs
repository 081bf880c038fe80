//! Slack Integration - Events API webhook interface
//!
//! This crate provides the Slack side of pagebot:
//! - **Events** (`events`) - Events API payloads, envelopes and the dispatcher
//! - **Mentions** (`mention`) - `app_mention` responder that answers in-thread
//! - **Retries** (`retry`) - drops Slack's `http_timeout` redeliveries
//! - **Signatures** (`signature`) - `X-Slack-Signature` request verification
//! - **Web API** (`web_api`) - `chat.postMessage` client
//!
//! # Getting Started
//!
//! 1. Create a Slack app at https://api.slack.com/apps
//! 2. Enable Event Subscriptions, point the request URL at `/slack/events`
//! 3. Subscribe to the `app_mention` bot event and add the `chat:write` scope
//! 4. Set env vars: `SLACK_BOT_TOKEN`, `SLACK_SIGNING_SECRET`
//!
//! # Architecture
//!
//! ```text
//! HTTP request → SignatureVerifier → retry filter → parse_payload
//!                                                       ↓
//!       chat.postMessage ← AppMentionHandler ← EventDispatcher
//! ```

pub mod events;
pub mod mention;
pub mod retry;
pub mod signature;
pub mod web_api;
