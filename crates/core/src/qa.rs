use async_trait::async_trait;
use serde::Serialize;

use crate::errors::ApplicationError;

/// Appended to every mention before it is sent to the answer service.
pub const ANSWER_LANGUAGE_INSTRUCTION: &str = "\n\nanswer in Japanese.";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct QaAnswer {
    pub answer: String,
    pub sources: String,
}

#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn answer(&self, question: &str) -> Result<QaAnswer, ApplicationError>;
}

pub fn build_question(text: &str) -> String {
    format!("{text}{ANSWER_LANGUAGE_INSTRUCTION}")
}
