use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::ApplicationError;

/// A chunk returned by similarity search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Cosine distance to the query; smaller is closer.
    pub distance: Option<f64>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self { page_content: page_content.into(), metadata: Map::new(), distance: None }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.metadata.insert("source".to_owned(), Value::String(source.into()));
        self
    }

    /// `metadata.source` when it is a string, otherwise empty.
    pub fn source(&self) -> &str {
        self.metadata.get("source").and_then(Value::as_str).unwrap_or("")
    }
}

#[async_trait]
pub trait Embeddings: Send + Sync {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ApplicationError>;
}

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn relevant_documents(&self, query: &str) -> Result<Vec<Document>, ApplicationError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Document;

    #[test]
    fn source_reads_string_metadata_only() {
        let document = Document::new("body").with_source("https://wiki/pages/42");
        assert_eq!(document.source(), "https://wiki/pages/42");

        let mut numeric = Document::new("body");
        numeric.metadata.insert("source".to_owned(), json!(42));
        assert_eq!(numeric.source(), "");

        assert_eq!(Document::new("body").source(), "");
    }
}
