use async_trait::async_trait;
use pagebot_core::ApplicationError;

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ApplicationError>;
}
