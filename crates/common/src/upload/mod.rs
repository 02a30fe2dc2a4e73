//! Pay-then-pin upload sequencing.

use bytes::Bytes;
use mime::Mime;

mod orchestrator;
mod state;

pub use orchestrator::{Orchestrator, UploadConfig, PAYMENT_ALERT_TARGET};
pub use state::{FailureReason, Outcome, Step, UploadFailure, UploadState};

/// Raw content plus what the uploader told us about it
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub content: Bytes,
    pub name: String,
    pub mime: Mime,
}

impl UploadRequest {
    /// Build a request. Without a declared MIME type one is guessed
    ///  from `name`, falling back to `application/octet-stream`.
    pub fn new(content: impl Into<Bytes>, name: impl Into<String>, mime: Option<Mime>) -> Self {
        let name = name.into();
        let mime = mime.unwrap_or_else(|| mime_guess::from_path(&name).first_or_octet_stream());
        Self {
            content: content.into(),
            name,
            mime,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_guessed_from_name() {
        let request = UploadRequest::new(b"{}".to_vec(), "data.json", None);
        assert_eq!(request.mime, mime::APPLICATION_JSON);
        assert_eq!(request.size_bytes(), 2);

        let request = UploadRequest::new(Vec::new(), "no-extension", None);
        assert_eq!(request.mime, mime::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn test_declared_mime_wins() {
        let request = UploadRequest::new(b"x".to_vec(), "photo.png", Some(mime::TEXT_PLAIN));
        assert_eq!(request.mime, mime::TEXT_PLAIN);
    }
}
