//! Answer generation for pagebot.
//!
//! - **OpenAI clients** (`openai`) - chat completions and embeddings over HTTPS
//! - **Prompting** (`prompt`) - the "stuff" prompt and answer/sources parsing
//! - **Chain** (`qa`) - retrieval QA with sources: retrieve, stuff, complete, parse
//!
//! # Architecture
//!
//! ```text
//! question → Retriever (pgvector) → stuff prompt → ChatModel → QaAnswer
//! ```
//!
//! The chain only depends on the `Retriever` and `ChatModel` seams, so tests
//! and the CLI can swap either side.

pub mod llm;
pub mod openai;
pub mod prompt;
pub mod qa;

pub use llm::ChatModel;
pub use openai::{OpenAiChatModel, OpenAiClient, OpenAiEmbeddings, OpenAiError};
pub use qa::RetrievalQaWithSourcesChain;
