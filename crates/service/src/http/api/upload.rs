use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use mime::Mime;
use serde::{Deserialize, Serialize};

use common::ledger::TxRef;
use common::record::FileRecord;
use common::upload::{FailureReason, UploadFailure, UploadRequest};

use super::error_response;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(flatten)]
    pub record: FileRecord,
    pub accessible_at: String,
    /// Ledger reference for the identifier, when anchoring is on and
    ///  succeeded
    pub anchor_tx: Option<TxRef>,
}

pub async fn handler(
    State(state): State<ServiceState>,
    mut multipart: Multipart,
) -> Result<Response, UploadError> {
    let mut content: Option<(Option<String>, Bytes)> = None;
    let mut name: Option<String> = None;
    let mut declared_mime: Option<Mime> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| UploadError::Multipart(e.to_string()))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field.file_name().map(|s| s.to_string());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| UploadError::Multipart(e.to_string()))?;
                content = Some((filename, data));
            }
            "name" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Multipart(e.to_string()))?;
                if !text.trim().is_empty() {
                    name = Some(text.trim().to_string());
                }
            }
            "mime" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| UploadError::Multipart(e.to_string()))?;
                let mime = text
                    .trim()
                    .parse::<Mime>()
                    .map_err(|_| UploadError::InvalidRequest(format!("invalid mime: {}", text)))?;
                declared_mime = Some(mime);
            }
            _ => {}
        }
    }

    let (filename, data) =
        content.ok_or_else(|| UploadError::InvalidRequest("file is required".into()))?;
    let name = name
        .or(filename)
        .unwrap_or_else(|| "unnamed".to_string());
    let request = UploadRequest::new(data, name, declared_mime);

    tracing::info!(
        name = %request.name,
        size = request.size_bytes(),
        mime = %request.mime,
        "upload requested"
    );

    // once paid for, an upload runs to a terminal state even if the
    //  client goes away
    let task_state = state.clone();
    let (record, anchor_tx) = tokio::spawn(async move {
        let record = task_state.orchestrator().upload(request).await?;
        let anchor_tx = if task_state.anchor_references() {
            task_state.orchestrator().anchor(&record).await
        } else {
            None
        };
        Ok::<_, UploadFailure>((record, anchor_tx))
    })
    .await
    .map_err(|e| UploadError::Aborted(e.to_string()))??;

    let response = UploadResponse {
        accessible_at: record.accessible_at(state.public_gateway_url()),
        record,
        anchor_tx,
    };
    Ok((http::StatusCode::OK, Json(response)).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Multipart error: {0}")]
    Multipart(String),
    #[error("upload failed: {0}")]
    Failed(#[from] UploadFailure),
    #[error("upload task aborted: {0}")]
    Aborted(String),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        match self {
            UploadError::InvalidRequest(msg) | UploadError::Multipart(msg) => {
                error_response(http::StatusCode::BAD_REQUEST, "invalid_request", msg)
            }
            UploadError::Failed(failure) => {
                let status = match failure.reason {
                    FailureReason::PaymentSubmissionFailed | FailureReason::PaymentRejected => {
                        http::StatusCode::PAYMENT_REQUIRED
                    }
                    FailureReason::PaymentTimeout | FailureReason::Cancelled => {
                        http::StatusCode::GATEWAY_TIMEOUT
                    }
                    FailureReason::QuotaExceeded => http::StatusCode::CONFLICT,
                    FailureReason::UploadFailedAfterPayment => http::StatusCode::BAD_GATEWAY,
                };
                let body = serde_json::json!({
                    "error": failure.reason,
                    "message": failure.message,
                    "retryable": failure.reason.is_retryable(),
                    "funds_at_risk": failure.funds_at_risk,
                    "payment_tx": failure.payment_tx,
                    "receipt": failure.receipt,
                });
                (status, Json(body)).into_response()
            }
            UploadError::Aborted(msg) => {
                tracing::error!(%msg, "upload task did not finish");
                error_response(
                    http::StatusCode::INTERNAL_SERVER_ERROR,
                    "internal",
                    "Unexpected error".to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::response::Response;
    use axum::Router;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    use common::ledger::AllocationLedger;

    use crate::http::tests::{json, test_app};

    const BOUNDARY: &str = "pinpay-test-boundary";

    fn multipart_body(parts: &[(&str, Option<&str>, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, filename, data) in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(data.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    async fn post(router: &Router, body: Vec<u8>) -> Response {
        let request = Request::post("/api/upload")
            .header(
                http::header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        router.clone().oneshot(request).await.unwrap()
    }

    #[tokio::test]
    async fn test_upload_persists_and_pins() {
        let app = test_app();
        let body = multipart_body(&[("file", Some("notes.txt"), "# hello\n")]);

        let response = post(&app.router, body).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["display_name"], "notes.txt");
        assert_eq!(body["size_bytes"], 8);
        assert_eq!(body["kind"], "text/plain");

        let identifier = body["identifier"].as_str().unwrap().to_string();
        assert_eq!(
            body["accessible_at"],
            format!("http://127.0.0.1:8080/ipfs/{}", identifier)
        );
        assert!(body["payment_tx"].as_str().unwrap().starts_with("0x"));
        assert!(body["anchor_tx"].is_string());
        assert_eq!(app.storage.pinned().len(), 1);
        assert_eq!(app.ledger.anchors().len(), 1);
    }

    #[tokio::test]
    async fn test_declared_name_and_mime_win() {
        let app = test_app();
        let body = multipart_body(&[
            ("name", None, "report"),
            ("mime", None, "application/pdf"),
            ("file", Some("upload.bin"), "%PDF-1.4"),
        ]);

        let response = post(&app.router, body).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["display_name"], "report");
        assert_eq!(body["kind"], "application/pdf");
    }

    #[tokio::test]
    async fn test_missing_file_is_bad_request() {
        let app = test_app();
        let body = multipart_body(&[("name", None, "nothing")]);

        let response = post(&app.router, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(app.storage.pinned().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_mime_is_bad_request() {
        let app = test_app();
        let body = multipart_body(&[
            ("mime", None, "not a mime"),
            ("file", Some("a.txt"), "a"),
        ]);

        let response = post(&app.router, body).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unaffordable_upload_is_payment_required() {
        let app = test_app();
        let before = app.ledger.balance().await.unwrap();

        // spend everything first so the next purchase cannot be submitted
        app.ledger.purchase(before.funds).await.unwrap();

        let body = multipart_body(&[("file", Some("a.txt"), "a")]);
        let response = post(&app.router, body).await;
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

        let body = json(response).await;
        assert_eq!(body["error"], "payment_submission_failed");
        assert_eq!(body["retryable"], true);
        assert_eq!(body["funds_at_risk"], false);
        assert!(app.storage.pinned().is_empty());
    }
}
