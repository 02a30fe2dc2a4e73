use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;

use common::ledger::LedgerError;

use super::error_response;
use crate::ServiceState;

pub async fn handler(State(state): State<ServiceState>) -> Result<Response, AllocationError> {
    let balance = state.ledger().balance().await?;
    Ok((http::StatusCode::OK, Json(balance)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for AllocationError {
    fn into_response(self) -> Response {
        match self {
            AllocationError::Ledger(err) => {
                tracing::warn!(%err, "balance query failed");
                error_response(
                    http::StatusCode::SERVICE_UNAVAILABLE,
                    "ledger_unavailable",
                    err.to_string(),
                )
            }
        }
    }
}
