use std::sync::Arc;

use async_trait::async_trait;
use pagebot_core::{build_question, QuestionAnswerer};
use tracing::{debug, info};

use crate::events::{
    EventContext, EventHandler, EventHandlerError, HandlerResult, SlackEnvelope, SlackEvent,
    SlackEventType,
};
use crate::web_api::{MessagePoster, OutboundMessage};

/// Answers `app_mention` events in the thread they came from.
pub struct AppMentionHandler {
    answerer: Arc<dyn QuestionAnswerer>,
    poster: Arc<dyn MessagePoster>,
}

impl AppMentionHandler {
    pub fn new(answerer: Arc<dyn QuestionAnswerer>, poster: Arc<dyn MessagePoster>) -> Self {
        Self { answerer, poster }
    }
}

#[async_trait]
impl EventHandler for AppMentionHandler {
    fn event_type(&self) -> SlackEventType {
        SlackEventType::AppMention
    }

    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let SlackEvent::AppMention(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if event.is_authored_by(&envelope.receiver) {
            debug!(
                event_name = "slack.mention.self_ignored",
                correlation_id = %ctx.correlation_id,
                channel = %event.channel,
                "ignoring mention posted by this bot"
            );
            return Ok(HandlerResult::Ignored);
        }

        let question = build_question(&event.text);
        let answer = self.answerer.answer(&question).await?;

        let message = OutboundMessage {
            channel: event.channel.clone(),
            text: answer.answer,
            thread_ts: event.reply_thread_ts().to_owned(),
        };
        self.poster.post_message(&message).await?;

        info!(
            event_name = "slack.mention.answered",
            correlation_id = %ctx.correlation_id,
            channel = %message.channel,
            thread_id = %message.thread_ts,
            sources = %answer.sources,
            "answered mention"
        );
        Ok(HandlerResult::Replied(message))
    }
}
