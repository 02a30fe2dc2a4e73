use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use http::header::{ACCEPT, CONTENT_TYPE, ORIGIN};
use http::{Method, StatusCode};
use tower_http::cors::{Any, CorsLayer};

use common::storage::StorageError;

pub mod allocation;
pub mod files;
pub mod quote;
pub mod upload;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    let cors_layer = CorsLayer::new()
        .allow_methods(vec![Method::GET, Method::POST])
        .allow_headers(vec![ACCEPT, CONTENT_TYPE, ORIGIN])
        .allow_origin(Any)
        .allow_credentials(false);

    Router::new()
        .route("/upload", post(upload::handler))
        .route("/ipfs/files", get(files::handler))
        .route("/quote", get(quote::handler))
        .route("/allocation", get(allocation::handler))
        .with_state(state)
        .layer(cors_layer)
}

/// JSON error body shared by every API handler
pub(crate) fn error_response(status: StatusCode, error: &str, message: String) -> Response {
    let body = serde_json::json!({
        "error": error,
        "message": message,
    });
    (status, Json(body)).into_response()
}

/// Read-path storage failures as HTTP
pub(crate) fn storage_error_response(err: StorageError) -> Response {
    let (status, error) = match &err {
        StorageError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StorageError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
        StorageError::InvalidIdentifier(_) => (StatusCode::BAD_REQUEST, "invalid_identifier"),
        StorageError::NotADirectory(_) | StorageError::Unavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "storage_unavailable")
        }
    };
    error_response(status, error, err.to_string())
}
