use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::storage::{with_timeout, ChildDescriptor, Cid, StorageError, StorageGateway};

/// Content bytes in order, read lazily chunk by chunk
pub type ByteStream = BoxStream<'static, Result<Bytes, StorageError>>;

pub enum Resolved {
    Directory(Vec<ChildDescriptor>),
    Content(ByteStream),
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resolved::Directory(children) => f.debug_tuple("Directory").field(children).finish(),
            Resolved::Content(_) => f.write_str("Content(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub list_timeout: Duration,
    /// Bound on each chunk read, not on the whole transfer
    pub read_timeout: Duration,
    pub chunk_size: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            list_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            chunk_size: 256 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Retrieval {
    storage: Arc<dyn StorageGateway>,
    config: RetrievalConfig,
}

struct Cursor {
    storage: Arc<dyn StorageGateway>,
    identifier: Cid,
    offset: u64,
    chunk_size: u64,
    timeout: Duration,
    done: bool,
}

impl Retrieval {
    pub fn new(storage: Arc<dyn StorageGateway>, config: RetrievalConfig) -> Self {
        Self { storage, config }
    }

    /// Resolve `identifier` to a directory listing or its bytes.
    ///
    /// A directory listing is tried first. An empty or failed listing
    ///  falls through to reading content; [`StorageError::NotFound`] is
    ///  only returned once both have failed.
    pub async fn resolve(&self, identifier: &Cid) -> Result<Resolved, StorageError> {
        let timeout = self.config.list_timeout;
        match with_timeout(timeout, self.storage.list_children(identifier, timeout)).await {
            Ok(children) if !children.is_empty() => return Ok(Resolved::Directory(children)),
            Ok(_) => {}
            Err(err) => tracing::trace!(%identifier, %err, "listing failed, reading as bytes"),
        }

        let chunk_size = self.config.chunk_size.max(1);
        let timeout = self.config.read_timeout;
        let first = with_timeout(
            timeout,
            self.storage.read_at(identifier, 0, chunk_size, timeout),
        )
        .await
        .map_err(|err| match err {
            StorageError::Timeout(_) | StorageError::Unavailable(_) => err,
            _ => StorageError::NotFound(*identifier),
        })?;

        let cursor = Cursor {
            storage: self.storage.clone(),
            identifier: *identifier,
            offset: first.len() as u64,
            chunk_size,
            timeout,
            done: (first.len() as u64) < chunk_size,
        };
        let rest = stream::unfold(cursor, next_chunk);
        let body = stream::once(async move { Ok(first) })
            .chain(rest)
            .try_filter(|chunk| futures::future::ready(!chunk.is_empty()));

        Ok(Resolved::Content(body.boxed()))
    }
}

async fn next_chunk(mut cursor: Cursor) -> Option<(Result<Bytes, StorageError>, Cursor)> {
    if cursor.done {
        return None;
    }
    let read = cursor.storage.read_at(
        &cursor.identifier,
        cursor.offset,
        cursor.chunk_size,
        cursor.timeout,
    );
    match with_timeout(cursor.timeout, read).await {
        Ok(chunk) => {
            cursor.offset += chunk.len() as u64;
            cursor.done = (chunk.len() as u64) < cursor.chunk_size;
            Some((Ok(chunk), cursor))
        }
        Err(err) => {
            tracing::warn!(identifier = %cursor.identifier, offset = cursor.offset, %err, "read failed mid-stream");
            cursor.done = true;
            Some((Err(err), cursor))
        }
    }
}

/// Drain a byte stream into one buffer
pub async fn collect(stream: ByteStream) -> Result<Bytes, StorageError> {
    stream
        .try_fold(BytesMut::new(), |mut buf, chunk| async move {
            buf.extend_from_slice(&chunk);
            Ok(buf)
        })
        .await
        .map(BytesMut::freeze)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{file_child, MemoryGateway, PutOptions};

    const T: Duration = Duration::from_secs(1);

    fn retrieval(gateway: &MemoryGateway, chunk_size: u64) -> Retrieval {
        Retrieval::new(
            Arc::new(gateway.clone()),
            RetrievalConfig {
                chunk_size,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_resolve_file_in_chunks() {
        let gateway = MemoryGateway::new();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let cid = gateway
            .put(Bytes::from(data.clone()), PutOptions::default(), T)
            .await
            .unwrap();

        let resolved = retrieval(&gateway, 64).resolve(&cid).await.unwrap();
        let Resolved::Content(stream) = resolved else {
            panic!("expected content");
        };
        let chunks: Vec<_> = stream.try_collect().await.unwrap();
        assert_eq!(chunks.len(), 16);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_resolve_exact_multiple_of_chunk() {
        let gateway = MemoryGateway::new();
        let cid = gateway
            .put(Bytes::from(vec![7u8; 128]), PutOptions::default(), T)
            .await
            .unwrap();

        let Resolved::Content(stream) = retrieval(&gateway, 64).resolve(&cid).await.unwrap()
        else {
            panic!("expected content");
        };
        assert_eq!(collect(stream).await.unwrap().len(), 128);
    }

    #[tokio::test]
    async fn test_resolve_directory() {
        let gateway = MemoryGateway::new();
        let child = gateway
            .put(Bytes::from_static(b"inside"), PutOptions::default(), T)
            .await
            .unwrap();
        let dir = gateway
            .put_directory(vec![file_child("inside.txt", child, 6)], PutOptions::default())
            .unwrap();

        match retrieval(&gateway, 64).resolve(&dir).await.unwrap() {
            Resolved::Directory(children) => {
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].name, "inside.txt");
            }
            other => panic!("expected directory, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_missing() {
        let gateway = MemoryGateway::new();
        let cid = gateway
            .put(Bytes::from_static(b"ephemeral"), PutOptions::default(), T)
            .await
            .unwrap();
        gateway.forget(&cid);

        let result = retrieval(&gateway, 64).resolve(&cid).await;
        assert!(matches!(result, Err(StorageError::NotFound(c)) if c == cid));
    }

    #[tokio::test]
    async fn test_resolve_empty_file() {
        let gateway = MemoryGateway::new();
        let cid = gateway
            .put(Bytes::new(), PutOptions::default(), T)
            .await
            .unwrap();

        let Resolved::Content(stream) = retrieval(&gateway, 64).resolve(&cid).await.unwrap()
        else {
            panic!("expected content");
        };
        assert!(collect(stream).await.unwrap().is_empty());
    }
}
