use std::time::Duration;

use async_trait::async_trait;
use pagebot_core::config::{OpenAiConfig, QaConfig};
use pagebot_core::{ApplicationError, Embeddings};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::llm::ChatModel;

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Error)]
pub enum OpenAiError {
    #[error("openai request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("openai returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("openai response had no {0}")]
    EmptyResponse(&'static str),
}

impl From<OpenAiError> for ApplicationError {
    fn from(error: OpenAiError) -> Self {
        Self::Integration(error.to_string())
    }
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

impl OpenAiClient {
    pub fn new(config: &OpenAiConfig) -> Result<Self, OpenAiError> {
        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;
        Ok(Self { http, base_url: config.base_url.clone(), api_key: config.api_key.clone() })
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, OpenAiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = endpoint(&self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                event_name = "egress.openai.error_status",
                path,
                status = status.as_u16(),
                "openai request was rejected"
            );
            return Err(OpenAiError::Status {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(response.json::<R>().await?)
    }
}

fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl ChatCompletionResponse {
    fn into_content(self) -> Result<String, OpenAiError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OpenAiError::EmptyResponse("choices[0].message.content"))
    }
}

/// Chat completions with a fixed model and temperature.
pub struct OpenAiChatModel {
    client: OpenAiClient,
    model: String,
    temperature: f32,
}

impl OpenAiChatModel {
    pub fn new(client: OpenAiClient, qa: &QaConfig) -> Self {
        Self { client, model: qa.model.clone(), temperature: qa.temperature }
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, ApplicationError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        debug!(
            event_name = "egress.openai.chat",
            model = %self.model,
            "requesting chat completion"
        );
        let response: ChatCompletionResponse =
            self.client.post_json("chat/completions", &request).await?;
        Ok(response.into_content()?)
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl EmbeddingResponse {
    fn into_vector(self) -> Result<Vec<f32>, OpenAiError> {
        self.data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .filter(|embedding| !embedding.is_empty())
            .ok_or(OpenAiError::EmptyResponse("data[0].embedding"))
    }
}

pub struct OpenAiEmbeddings {
    client: OpenAiClient,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(client: OpenAiClient, config: &OpenAiConfig) -> Self {
        Self { client, model: config.embedding_model.clone() }
    }
}

#[async_trait]
impl Embeddings for OpenAiEmbeddings {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApplicationError> {
        let request = EmbeddingRequest { model: &self.model, input: vec![normalize_input(text)] };

        debug!(
            event_name = "egress.openai.embeddings",
            model = %self.model,
            "requesting embedding"
        );
        let response: EmbeddingResponse = self.client.post_json("embeddings", &request).await?;
        Ok(response.into_vector()?)
    }
}

// Newlines degrade ada-002 embedding quality.
fn normalize_input(text: &str) -> String {
    text.replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::Bytes,
        extract::State,
        http::{HeaderMap, StatusCode, Uri},
        Json, Router,
    };
    use pagebot_core::config::{AppConfig, OpenAiConfig};
    use pagebot_core::{ApplicationError, Embeddings};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tokio::sync::Mutex;

    use super::{
        endpoint, normalize_input, ChatCompletionRequest, ChatCompletionResponse, ChatMessage,
        EmbeddingResponse, OpenAiChatModel, OpenAiClient, OpenAiEmbeddings, OpenAiError,
    };
    use crate::llm::ChatModel;

    #[derive(Debug)]
    struct ReceivedCall {
        path: String,
        authorization: Option<String>,
        body: Value,
    }

    #[derive(Clone)]
    struct StubOpenAi {
        status: StatusCode,
        reply: Value,
        calls: Arc<Mutex<Vec<ReceivedCall>>>,
    }

    async fn record(
        State(stub): State<StubOpenAi>,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    ) -> (StatusCode, Json<Value>) {
        stub.calls.lock().await.push(ReceivedCall {
            path: uri.path().to_owned(),
            authorization: headers
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });
        (stub.status, Json(stub.reply.clone()))
    }

    /// Serves `reply` with `status` on an ephemeral port; returns the base url.
    async fn serve_stub(status: StatusCode, reply: Value) -> (String, StubOpenAi) {
        let stub = StubOpenAi { status, reply, calls: Arc::new(Mutex::new(Vec::new())) };
        let app = Router::new().fallback(record).with_state(stub.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{address}/v1"), stub)
    }

    fn config_for(base_url: &str) -> OpenAiConfig {
        OpenAiConfig {
            api_key: SecretString::from("sk-test-key"),
            base_url: base_url.to_owned(),
            embedding_model: "text-embedding-ada-002".to_owned(),
            timeout_secs: 5,
        }
    }

    fn chat_model(base_url: &str) -> OpenAiChatModel {
        let client = OpenAiClient::new(&config_for(base_url)).expect("client");
        OpenAiChatModel::new(client, &AppConfig::default().qa)
    }

    #[tokio::test]
    async fn chat_completion_posts_model_and_prompt_with_bearer_key() {
        let (base_url, stub) = serve_stub(
            StatusCode::OK,
            json!({"choices": [{"message": {"role": "assistant", "content": "答え"}}]}),
        )
        .await;

        let content = chat_model(&base_url).complete("prompt text").await.expect("completion");

        assert_eq!(content, "答え");
        let calls = stub.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/v1/chat/completions");
        assert_eq!(calls[0].authorization.as_deref(), Some("Bearer sk-test-key"));
        assert_eq!(calls[0].body["model"], "gpt-4");
        assert_eq!(calls[0].body["temperature"], 0.0);
        assert_eq!(calls[0].body["messages"][0]["content"], "prompt text");
    }

    #[tokio::test]
    async fn error_status_keeps_code_and_body() {
        let (base_url, _stub) = serve_stub(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": {"message": "overloaded"}}),
        )
        .await;
        let client = OpenAiClient::new(&config_for(&base_url)).expect("client");

        let error = client
            .post_json::<_, Value>("chat/completions", &json!({}))
            .await
            .expect_err("status error");

        assert!(matches!(
            error,
            OpenAiError::Status { status: 503, ref body } if body.contains("overloaded")
        ));
    }

    #[tokio::test]
    async fn error_status_surfaces_as_integration_error() {
        let (base_url, _stub) =
            serve_stub(StatusCode::TOO_MANY_REQUESTS, json!({"error": {"message": "slow down"}}))
                .await;
        let client = OpenAiClient::new(&config_for(&base_url)).expect("client");
        let embeddings = OpenAiEmbeddings::new(client, &config_for(&base_url));

        let error = embeddings.embed_query("hello").await.expect_err("embedding failure");

        assert!(matches!(error, ApplicationError::Integration(message) if message.contains("429")));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_integration_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("local addr");
        drop(listener);

        let error = chat_model(&format!("http://{address}/v1"))
            .complete("prompt text")
            .await
            .expect_err("transport failure");

        assert!(matches!(error, ApplicationError::Integration(_)));
    }

    #[test]
    fn endpoint_joins_without_duplicate_slashes() {
        assert_eq!(
            endpoint("https://api.openai.com/v1/", "/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            endpoint("http://localhost:8089", "embeddings"),
            "http://localhost:8089/embeddings"
        );
    }

    #[test]
    fn chat_request_carries_model_temperature_and_single_user_message() {
        let request = ChatCompletionRequest {
            model: "gpt-4",
            temperature: 0.0,
            messages: vec![ChatMessage { role: "user", content: "prompt text" }],
        };

        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            value,
            json!({
                "model": "gpt-4",
                "temperature": 0.0,
                "messages": [{"role": "user", "content": "prompt text"}]
            })
        );
    }

    #[test]
    fn chat_response_yields_first_choice_content() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "答え\nSOURCES: a"}}]
        }))
        .expect("deserialize");

        assert_eq!(response.into_content().expect("content"), "答え\nSOURCES: a");
    }

    #[test]
    fn chat_response_without_choices_is_an_error() {
        let response: ChatCompletionResponse =
            serde_json::from_value(json!({"choices": []})).expect("deserialize");

        assert!(matches!(response.into_content(), Err(OpenAiError::EmptyResponse(_))));
    }

    #[test]
    fn embedding_response_yields_first_vector() {
        let response: EmbeddingResponse = serde_json::from_value(json!({
            "data": [{"index": 0, "embedding": [0.5, -0.25]}],
            "model": "text-embedding-ada-002"
        }))
        .expect("deserialize");

        assert_eq!(response.into_vector().expect("vector"), vec![0.5, -0.25]);
    }

    #[test]
    fn empty_embedding_is_an_error() {
        let response: EmbeddingResponse =
            serde_json::from_value(json!({"data": [{"embedding": []}]})).expect("deserialize");

        assert!(matches!(response.into_vector(), Err(OpenAiError::EmptyResponse(_))));
    }

    #[test]
    fn embedding_input_flattens_newlines() {
        assert_eq!(normalize_input("hello\n\nanswer in Japanese."), "hello  answer in Japanese.");
    }
}
