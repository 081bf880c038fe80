use std::sync::Arc;

use pagebot_agent::{
    OpenAiChatModel, OpenAiClient, OpenAiEmbeddings, RetrievalQaWithSourcesChain,
};
use pagebot_core::config::{AppConfig, LoadOptions};
use pagebot_core::{build_question, ApplicationError, QuestionAnswerer};
use pagebot_db::{connect, PgVectorStore};
use serde_json::json;

use crate::commands::{
    current_thread_runtime, CommandResult, EXIT_CONFIG, EXIT_DATABASE, EXIT_RUNTIME_INIT,
    EXIT_UPSTREAM,
};

pub fn run(text: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "config_validation",
                format!("configuration issue: {error}"),
                EXIT_CONFIG,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "ask",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                EXIT_RUNTIME_INIT,
            );
        }
    };

    let question = build_question(text);
    let result = runtime.block_on(async {
        let pool = connect(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DATABASE))?;

        let openai = OpenAiClient::new(&config.openai)
            .map_err(|error| ("runtime_init", error.to_string(), EXIT_RUNTIME_INIT))?;
        let embeddings = Arc::new(OpenAiEmbeddings::new(openai.clone(), &config.openai));
        let retriever =
            Arc::new(PgVectorStore::new(pool.clone(), embeddings, &config.qa.retriever));
        let llm = Arc::new(OpenAiChatModel::new(openai, &config.qa));
        let chain =
            RetrievalQaWithSourcesChain::from_chain_type(llm, config.qa.chain_type, retriever);

        let answer = chain.answer(&question).await.map_err(classify);
        pool.close().await;
        answer
    });

    match result {
        Ok(answer) => CommandResult::success(
            "ask",
            answer.answer.clone(),
            json!({ "question": question, "answer": answer.answer, "sources": answer.sources }),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("ask", error_class, message, exit_code)
        }
    }
}

fn classify(error: ApplicationError) -> (&'static str, String, u8) {
    match error {
        ApplicationError::Persistence(message) => ("db_query", message, EXIT_DATABASE),
        ApplicationError::Integration(message) => ("upstream", message, EXIT_UPSTREAM),
        ApplicationError::InvalidInput(message) | ApplicationError::Configuration(message) => {
            ("runtime_init", message, EXIT_RUNTIME_INIT)
        }
    }
}

#[cfg(test)]
mod tests {
    use pagebot_core::ApplicationError;

    use super::classify;

    #[test]
    fn classify_maps_failures_to_exit_codes() {
        assert_eq!(
            classify(ApplicationError::Persistence("relation missing".to_string())),
            ("db_query", "relation missing".to_string(), 4)
        );
        assert_eq!(
            classify(ApplicationError::Integration("openai returned 429".to_string())),
            ("upstream", "openai returned 429".to_string(), 5)
        );
        assert_eq!(classify(ApplicationError::Configuration("x".to_string())).2, 3);
    }
}
