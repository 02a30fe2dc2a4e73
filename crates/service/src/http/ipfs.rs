use axum::body::Body;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use common::index::sniff;
use common::retrieval::Resolved;
use common::storage::{cid_string, parse_identifier, ChildDescriptor, Cid, StorageError};

use super::api::storage_error_response;
use crate::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryListing {
    #[serde(with = "cid_string")]
    pub identifier: Cid,
    pub children: Vec<ChildDescriptor>,
}

/// Serve a directory listing as JSON or stream the content bytes.
///  The content type of a byte stream is sniffed from its first chunk.
pub async fn handler(
    State(state): State<ServiceState>,
    Path(cid): Path<String>,
) -> Result<Response, RetrieveError> {
    let identifier = parse_identifier(&cid)?;

    match state.retrieval().resolve(&identifier).await? {
        Resolved::Directory(children) => Ok((
            http::StatusCode::OK,
            Json(DirectoryListing {
                identifier,
                children,
            }),
        )
            .into_response()),
        Resolved::Content(mut body) => {
            let first = match body.next().await {
                Some(chunk) => chunk?,
                None => bytes::Bytes::new(),
            };
            let content_type = sniff(&first)
                .unwrap_or(mime::APPLICATION_OCTET_STREAM)
                .to_string();
            let body = stream::once(async move { Ok::<_, StorageError>(first) }).chain(body);

            Ok((
                http::StatusCode::OK,
                [(http::header::CONTENT_TYPE, content_type)],
                Body::from_stream(body),
            )
                .into_response())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetrieveError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl IntoResponse for RetrieveError {
    fn into_response(self) -> Response {
        match self {
            RetrieveError::Storage(err) => storage_error_response(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use bytes::Bytes;
    use http::StatusCode;

    use common::storage::{file_child, PutOptions, StorageGateway};

    use crate::http::tests::{get, json, test_app};

    const T: std::time::Duration = std::time::Duration::from_secs(1);

    #[tokio::test]
    async fn test_streams_file_bytes() {
        let app = test_app();
        let data = b"GIF89a and then some pixels";
        let cid = app
            .storage
            .put(Bytes::from_static(data), PutOptions::default(), T)
            .await
            .unwrap();

        let response = get(&app.router, &format!("/ipfs/{}", cid)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[http::header::CONTENT_TYPE], "image/gif");
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], data);
    }

    #[tokio::test]
    async fn test_lists_directory() {
        let app = test_app();
        let child = app
            .storage
            .put(Bytes::from_static(b"hi"), PutOptions::default(), T)
            .await
            .unwrap();
        let dir = app
            .storage
            .put_directory(vec![file_child("hi.txt", child, 2)], PutOptions::default())
            .unwrap();

        let response = get(&app.router, &format!("/ipfs/{}", dir)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["identifier"], dir.to_string());
        assert_eq!(body["children"][0]["name"], "hi.txt");
        assert_eq!(body["children"][0]["identifier"], child.to_string());
    }

    #[tokio::test]
    async fn test_missing_and_invalid() {
        let app = test_app();
        let missing = app
            .storage
            .put(Bytes::from_static(b"gone"), PutOptions::default(), T)
            .await
            .unwrap();
        app.storage.forget(&missing);

        let response = get(&app.router, &format!("/ipfs/{}", missing)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json(response).await["error"], "not_found");

        let response = get(&app.router, "/ipfs/not-a-cid").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
