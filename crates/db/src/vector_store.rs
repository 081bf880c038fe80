//! Read side of a LangChain-compatible pgvector store.
//!
//! Documents live in `langchain_pg_embedding`, grouped by the named rows of
//! `langchain_pg_collection`. Index construction happens elsewhere; this
//! module only searches.

use std::sync::Arc;

use async_trait::async_trait;
use pagebot_core::config::RetrieverConfig;
use pagebot_core::{ApplicationError, Document, Embeddings, Retriever};
use pgvector::Vector;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::DbPool;

const SIMILARITY_SEARCH_SQL: &str = "\
SELECT e.document, e.cmetadata, (e.embedding <=> $1) AS distance \
FROM langchain_pg_embedding e \
JOIN langchain_pg_collection c ON e.collection_id = c.uuid \
WHERE c.name = $2 \
ORDER BY distance ASC \
LIMIT $3";

const COLLECTION_EXISTS_SQL: &str =
    "SELECT EXISTS (SELECT 1 FROM langchain_pg_collection WHERE name = $1)";

type SearchRow = (Option<String>, Option<Value>, Option<f64>);

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("embedding failed: {0}")]
    Embedding(#[from] ApplicationError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => Self::Persistence(error.to_string()),
            RepositoryError::Embedding(error) => error,
        }
    }
}

pub struct PgVectorStore {
    pool: DbPool,
    embeddings: Arc<dyn Embeddings>,
    collection: String,
    top_k: usize,
}

impl PgVectorStore {
    pub fn new(pool: DbPool, embeddings: Arc<dyn Embeddings>, retriever: &RetrieverConfig) -> Self {
        Self {
            pool,
            embeddings,
            collection: retriever.collection.clone(),
            top_k: retriever.top_k.max(1),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<Document>, RepositoryError> {
        let embedding = self.embeddings.embed_query(query).await?;
        self.similarity_search_by_vector(embedding, k).await
    }

    pub async fn similarity_search_by_vector(
        &self,
        embedding: Vec<f32>,
        k: usize,
    ) -> Result<Vec<Document>, RepositoryError> {
        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let rows = sqlx::query_as::<_, SearchRow>(SIMILARITY_SEARCH_SQL)
            .bind(Vector::from(embedding))
            .bind(&self.collection)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            warn!(
                event_name = "retrieval.vector_store.empty",
                collection = %self.collection,
                "similarity search returned no documents"
            );
        } else {
            debug!(
                event_name = "retrieval.vector_store.searched",
                collection = %self.collection,
                returned = rows.len(),
                "similarity search completed"
            );
        }

        Ok(rows
            .into_iter()
            .map(|(content, metadata, distance)| document_from_row(content, metadata, distance))
            .collect())
    }
}

#[async_trait]
impl Retriever for PgVectorStore {
    async fn relevant_documents(&self, query: &str) -> Result<Vec<Document>, ApplicationError> {
        self.similarity_search(query, self.top_k).await.map_err(ApplicationError::from)
    }
}

/// Whether `langchain_pg_collection` has a row named `collection`. Needs no
/// embeddings, so readiness checks can call it with only a pool.
pub async fn collection_exists(pool: &DbPool, collection: &str) -> Result<bool, RepositoryError> {
    let exists = sqlx::query_scalar::<_, bool>(COLLECTION_EXISTS_SQL)
        .bind(collection)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

fn document_from_row(
    content: Option<String>,
    metadata: Option<Value>,
    distance: Option<f64>,
) -> Document {
    let metadata = match metadata {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    Document { page_content: content.unwrap_or_default(), metadata, distance }
}
