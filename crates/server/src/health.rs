use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use pagebot_db::{collection_exists, DbPool};
use serde::Serialize;

pub const HEALTH_PATH: &str = "/health";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Ready,
    Degraded,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: CheckStatus,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Degraded, detail: detail.into() }
    }

    fn skipped(detail: impl Into<String>) -> Self {
        Self { status: CheckStatus::Skipped, detail: detail.into() }
    }
}

/// Everything a mention needs from storage before it can be answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreReadiness {
    pub database: HealthCheck,
    pub collection: HealthCheck,
}

impl StoreReadiness {
    fn is_ready(&self) -> bool {
        self.database.status == CheckStatus::Ready && self.collection.status == CheckStatus::Ready
    }
}

#[async_trait]
pub trait Readiness: Send + Sync {
    async fn check(&self) -> StoreReadiness;
}

/// Checks the Cloud SQL pool and the retriever's collection row.
pub struct PgReadiness {
    pool: DbPool,
    collection: String,
}

impl PgReadiness {
    pub fn new(pool: DbPool, collection: impl Into<String>) -> Self {
        Self { pool, collection: collection.into() }
    }
}

#[async_trait]
impl Readiness for PgReadiness {
    async fn check(&self) -> StoreReadiness {
        if let Err(error) = sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(&self.pool).await {
            return StoreReadiness {
                database: HealthCheck::degraded(format!("database query failed: {error}")),
                collection: HealthCheck::skipped("database is unreachable"),
            };
        }

        let database = HealthCheck::ready("database query succeeded");
        let collection = match collection_exists(&self.pool, &self.collection).await {
            Ok(true) => HealthCheck::ready(format!("collection `{}` is present", self.collection)),
            Ok(false) => {
                HealthCheck::degraded(format!("collection `{}` was not found", self.collection))
            }
            Err(error) => HealthCheck::degraded(format!("collection lookup failed: {error}")),
        };
        StoreReadiness { database, collection }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: CheckStatus,
    #[serde(flatten)]
    pub store: StoreReadiness,
    pub checked_at: String,
}

#[derive(Clone)]
pub struct HealthState {
    readiness: Arc<dyn Readiness>,
}

pub fn router(readiness: Arc<dyn Readiness>) -> Router {
    Router::new().route(HEALTH_PATH, get(health)).with_state(HealthState { readiness })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = state.readiness.check().await;
    let ready = store.is_ready();

    let payload = HealthResponse {
        status: if ready { CheckStatus::Ready } else { CheckStatus::Degraded },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}
