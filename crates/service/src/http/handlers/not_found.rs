use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

pub async fn not_found_handler(uri: Uri, headers: HeaderMap) -> Response {
    let wants_text = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.starts_with("text/"));

    if wants_text {
        return (
            StatusCode::NOT_FOUND,
            [(axum::http::header::CONTENT_TYPE, "text/plain")],
            "not found",
        )
            .into_response();
    }

    let body = serde_json::json!({
        "error": "not_found",
        "message": format!("no route for {}", uri.path()),
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
