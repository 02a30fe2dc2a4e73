use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::index::IndexEntry;
use common::record::accessible_at;
use common::storage::StorageError;

use super::storage_error_response;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    #[serde(flatten)]
    pub entry: IndexEntry,
    pub accessible_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesResponse {
    pub files: Vec<FileEntry>,
}

pub async fn handler(State(state): State<ServiceState>) -> Result<Response, FilesError> {
    let mut entries = state.reconciler().reconcile().await?;
    entries.sort_by(|a, b| a.display_name.cmp(&b.display_name));

    let files = entries
        .into_iter()
        .map(|entry| FileEntry {
            accessible_at: accessible_at(state.public_gateway_url(), &entry.identifier),
            entry,
        })
        .collect();

    Ok((http::StatusCode::OK, Json(FilesResponse { files })).into_response())
}

#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    #[error("pin listing failed: {0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for FilesError {
    fn into_response(self) -> Response {
        match self {
            FilesError::Storage(err) => {
                tracing::warn!(%err, "index reconciliation failed");
                storage_error_response(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use common::storage::{file_child, PutOptions, StorageGateway};

    use crate::http::tests::{get, json, test_app};

    #[tokio::test]
    async fn test_lists_pinned_content() {
        let app = test_app();
        let t = std::time::Duration::from_secs(1);
        let png = app
            .storage
            .put(Bytes::from_static(b"\x89PNG\r\n\x1a\n...."), PutOptions::default(), t)
            .await
            .unwrap();
        app.storage
            .put_directory(vec![file_child("pic.png", png, 12)], PutOptions::default())
            .unwrap();

        let response = get(&app.router, "/api/ipfs/files").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        let files = body["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);

        // sorted by display name, so the directory comes first
        assert_eq!(files[0]["kind"], "directory");
        assert_eq!(files[0]["size_bytes"], 12);
        assert_eq!(files[1]["kind"], "image/png");
        assert_eq!(
            files[1]["accessible_at"],
            format!("http://127.0.0.1:8080/ipfs/{}", png)
        );
    }

    #[tokio::test]
    async fn test_empty_index() {
        let app = test_app();
        let response = get(&app.router, "/api/ipfs/files").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json(response).await["files"], serde_json::json!([]));
    }
}
