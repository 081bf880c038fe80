use std::sync::Arc;

use async_trait::async_trait;
use pagebot_core::config::ChainType;
use pagebot_core::{ApplicationError, QaAnswer, QuestionAnswerer, Retriever};
use tracing::info;

use crate::llm::ChatModel;
use crate::prompt::{parse_answer, stuff_prompt};

/// Retrieval QA that returns the answer together with the sources the model
/// cited.
pub struct RetrievalQaWithSourcesChain {
    llm: Arc<dyn ChatModel>,
    chain_type: ChainType,
    retriever: Arc<dyn Retriever>,
}

impl RetrievalQaWithSourcesChain {
    pub fn from_chain_type(
        llm: Arc<dyn ChatModel>,
        chain_type: ChainType,
        retriever: Arc<dyn Retriever>,
    ) -> Self {
        Self { llm, chain_type, retriever }
    }
}

#[async_trait]
impl QuestionAnswerer for RetrievalQaWithSourcesChain {
    async fn answer(&self, question: &str) -> Result<QaAnswer, ApplicationError> {
        let documents = self.retriever.relevant_documents(question).await?;

        let prompt = match self.chain_type {
            ChainType::Stuff => stuff_prompt(question, &documents),
        };
        let output = self.llm.complete(&prompt).await?;
        let answer = parse_answer(&output);

        info!(
            event_name = "qa.chain.answered",
            chain_type = self.chain_type.as_str(),
            documents = documents.len(),
            sources = %answer.sources,
            "retrieval qa chain produced an answer"
        );

        Ok(answer)
    }
}
