use std::time::Duration;

use axum::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio::time::timeout;

use crate::ServiceState;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait DataSource: Send + Sync {
    /// Check that the storage network and ledger both answer
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("storage network unavailable: {0}")]
    Storage(String),
    #[error("ledger unavailable: {0}")]
    Ledger(String),
}

#[async_trait]
impl DataSource for ServiceState {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        self.storage()
            .list_pinned(PROBE_TIMEOUT)
            .await
            .map_err(|e| DataSourceError::Storage(e.to_string()))?;
        self.ledger()
            .balance()
            .await
            .map_err(|e| DataSourceError::Ledger(e.to_string()))?;
        Ok(())
    }
}

pub async fn handler(State(state): State<ServiceState>) -> Response {
    check(&state).await
}

pub async fn check(source: &dyn DataSource) -> Response {
    match timeout(HEALTH_CHECK_TIMEOUT, source.is_ready()).await {
        Ok(Ok(())) => {
            let msg = serde_json::json!({"status": "ok"});
            (StatusCode::OK, Json(msg)).into_response()
        }
        Ok(Err(e)) => {
            tracing::warn!(%e, "readiness check failed");
            let msg = serde_json::json!({"status": "failure", "message": e.to_string()});
            (StatusCode::SERVICE_UNAVAILABLE, Json(msg)).into_response()
        }
        Err(_) => {
            let msg = serde_json::json!({
                "status": "failure",
                "message": "health check timed out"
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(msg)).into_response()
        }
    }
}
