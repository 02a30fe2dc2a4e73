use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Upload size in bytes
    pub size: u64,
}

pub async fn handler(
    State(state): State<ServiceState>,
    Query(req): Query<QuoteRequest>,
) -> Response {
    let quote = state.orchestrator().quote(req.size);
    (http::StatusCode::OK, Json(quote)).into_response()
}
