use std::sync::Arc;

use axum::Router;
use pagebot_agent::{
    OpenAiChatModel, OpenAiClient, OpenAiEmbeddings, OpenAiError, RetrievalQaWithSourcesChain,
};
use pagebot_core::config::{AppConfig, ConfigError};
use pagebot_db::{connect_lazy, DbPool, PgVectorStore};
use pagebot_slack::{
    events::EventDispatcher,
    mention::AppMentionHandler,
    signature::SignatureVerifier,
    web_api::{SlackApiError, SlackWebClient},
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{health, webhook};

/// Process-wide state, built once before the listener starts.
pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub webhook: webhook::WebhookState,
}

impl Application {
    pub fn router(&self) -> Router {
        webhook::router(self.webhook.clone())
            .merge(health::router(Arc::new(health::PgReadiness::new(
                self.db_pool.clone(),
                self.config.qa.retriever.collection.clone(),
            ))))
            .layer(TraceLayer::new_for_http())
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("openai client initialization failed: {0}")]
    OpenAi(#[source] OpenAiError),
    #[error("slack client initialization failed: {0}")]
    Slack(#[source] SlackApiError),
}

/// Wires config into the pool, clients, QA chain and dispatcher. Opens no
/// connections, but the lazy pool must be created inside a tokio runtime.
pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let target = config.database.target()?;
    let db_pool = connect_lazy(&config.database)?;
    info!(
        event_name = "system.bootstrap.database_configured",
        correlation_id = "bootstrap",
        database = %target,
        "database pool configured"
    );

    let openai = OpenAiClient::new(&config.openai).map_err(BootstrapError::OpenAi)?;
    let embeddings = Arc::new(OpenAiEmbeddings::new(openai.clone(), &config.openai));
    let retriever = Arc::new(PgVectorStore::new(db_pool.clone(), embeddings, &config.qa.retriever));
    let llm = Arc::new(OpenAiChatModel::new(openai, &config.qa));
    let chain = Arc::new(RetrievalQaWithSourcesChain::from_chain_type(
        llm,
        config.qa.chain_type,
        retriever,
    ));

    let slack = Arc::new(SlackWebClient::new(&config.slack).map_err(BootstrapError::Slack)?);
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(AppMentionHandler::new(chain, slack));

    let verifier = SignatureVerifier::new(config.slack.signing_secret.clone());
    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        model = %config.qa.model,
        collection = %config.qa.retriever.collection,
        handlers = dispatcher.handler_count(),
        "retrieval qa chain and slack dispatcher initialized"
    );

    Ok(Application {
        config,
        db_pool,
        webhook: webhook::WebhookState::new(verifier, dispatcher),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use pagebot_core::config::{AppConfig, ConfigError};
    use tower::ServiceExt;

    use crate::bootstrap::{bootstrap_with_config, BootstrapError};

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.database.instance_connection_name = Some("proj:asia-northeast1:pages".to_string());
        config.database.name = Some("vectors".to_string());
        config.database.user = Some("bot".to_string());
        config.database.password = Some("secret".to_string().into());
        config.database.socket_root = "/nonexistent-pagebot-sockets".to_string();
        config.database.timeout_secs = 1;
        config.slack.bot_token = "xoxb-test".to_string().into();
        config.slack.signing_secret = "signing".to_string().into();
        config.openai.api_key = "sk-test".to_string().into();
        config
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_database_password() {
        let mut config = valid_config();
        config.database.password = None;

        let result = bootstrap_with_config(config);

        assert!(matches!(
            result,
            Err(BootstrapError::Config(ConfigError::MissingSetting { var: "DB_PASSWORD", .. }))
        ));
    }

    #[tokio::test]
    async fn bootstrap_builds_router_without_touching_the_network() {
        let app = bootstrap_with_config(valid_config()).expect("bootstrap");

        let response = app
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn events_route_requires_signature() {
        let app = bootstrap_with_config(valid_config()).expect("bootstrap");

        let response = app
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/slack/events")
                    .body(Body::from(r#"{"type":"url_verification","challenge":"c"}"#))
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
