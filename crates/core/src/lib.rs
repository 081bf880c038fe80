//! Shared building blocks for pagebot: layered configuration, the error
//! taxonomy, and the retrieval/answering seams the other crates plug into.

pub mod config;
pub mod errors;
pub mod qa;
pub mod retrieval;

pub use config::{AppConfig, CloudSqlTarget, ConfigError, LoadOptions, QaConfig};
pub use errors::{ApplicationError, InterfaceError};
pub use qa::{build_question, QaAnswer, QuestionAnswerer, ANSWER_LANGUAGE_INSTRUCTION};
pub use retrieval::{Document, Embeddings, Retriever};
