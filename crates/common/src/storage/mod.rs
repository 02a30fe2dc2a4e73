//! Uniform access to the content-addressed storage network.
//!
//! Every call takes an explicit timeout; nothing above this layer can
//!  wait on the network without a bound.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

mod kubo;
mod memory;

pub use cid::Cid;
pub use kubo::KuboGateway;
pub use memory::{file_child, MemoryGateway};

/// Lazy, finite sequence of pinned identifiers.
///  A yielded error aborts the listing.
pub type PinStream = BoxStream<'static, Result<Cid, StorageError>>;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage network unavailable: {0}")]
    Unavailable(String),
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),
    #[error("content not found: {0}")]
    NotFound(Cid),
    #[error("not a directory: {0}")]
    NotADirectory(Cid),
    #[error("invalid content identifier: {0}")]
    InvalidIdentifier(String),
}

impl StorageError {
    /// Read-path failures that a caller can retry without side effects
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageError::Unavailable(_) | StorageError::Timeout(_) | StorageError::NotFound(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    pub pin: bool,
}

impl Default for PutOptions {
    fn default() -> Self {
        Self { pin: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    File,
    Directory,
}

/// One link out of a directory node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildDescriptor {
    pub name: String,
    #[serde(with = "cid_string")]
    pub identifier: Cid,
    pub size_bytes: u64,
    pub kind: ChildKind,
}

/// The storage network as seen by the orchestrator, reconciler and
///  retrieval gateway. Implementations are shared read-only across
///  all callers, so they must be cheap to call concurrently.
#[async_trait]
pub trait StorageGateway: Send + Sync + std::fmt::Debug {
    /// Add `data` to the network, returning its content address
    async fn put(
        &self,
        data: Bytes,
        options: PutOptions,
        timeout: Duration,
    ) -> Result<Cid, StorageError>;

    async fn stat(&self, identifier: &Cid, timeout: Duration) -> Result<Stat, StorageError>;

    async fn list_pinned(&self, timeout: Duration) -> Result<PinStream, StorageError>;

    async fn list_children(
        &self,
        identifier: &Cid,
        timeout: Duration,
    ) -> Result<Vec<ChildDescriptor>, StorageError>;

    /// Read up to `length` bytes starting at `offset`.
    ///  A short (or empty) read means the end of the content.
    async fn read_at(
        &self,
        identifier: &Cid,
        offset: u64,
        length: u64,
        timeout: Duration,
    ) -> Result<Bytes, StorageError>;

    async fn peek_bytes(
        &self,
        identifier: &Cid,
        max_length: u64,
        timeout: Duration,
    ) -> Result<Bytes, StorageError> {
        self.read_at(identifier, 0, max_length, timeout).await
    }
}

/// Parse an identifier in the network's native string encoding
pub fn parse_identifier(s: &str) -> Result<Cid, StorageError> {
    Cid::try_from(s.trim()).map_err(|e| StorageError::InvalidIdentifier(format!("{}: {}", s, e)))
}

/// Bound `fut` by `timeout`, surfacing expiry as [`StorageError::Timeout`]
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}

/// Serde adapter that writes identifiers as their string form
///  rather than raw bytes
pub mod cid_string {
    use super::Cid;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(cid: &Cid, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&cid.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Cid, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Cid::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}
