use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use multihash::Multihash;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};

use super::{
    ChildDescriptor, ChildKind, Cid, PinStream, PutOptions, Stat, StorageError, StorageGateway,
};

/// Multicodec code for sha2-256
const SHA2_256: u64 = 0x12;
/// Domain separator so a directory node never hashes like a file
const DIRECTORY_PREFIX: &[u8] = b"pinpay-directory\0";

#[derive(Debug, Clone)]
enum Node {
    File(Bytes),
    Directory(Vec<ChildDescriptor>),
}

impl Node {
    fn size(&self) -> u64 {
        match self {
            Node::File(data) => data.len() as u64,
            Node::Directory(children) => children.iter().map(|c| c.size_bytes).sum(),
        }
    }
}

#[derive(Debug, Default)]
struct Network {
    blocks: HashMap<Cid, Node>,
    // insertion ordered, never duplicated
    pins: Vec<Cid>,
}

impl Network {
    fn pin(&mut self, cid: Cid) {
        if !self.pins.contains(&cid) {
            self.pins.push(cid);
        }
    }
}

/// An in-process content-addressed network.
///
/// Identifiers are CIDv0 (sha2-256) so they look like the ones a
///  local Kubo daemon hands out. Cloning shares the same network.
#[derive(Debug, Clone, Default)]
pub struct MemoryGateway {
    inner: Arc<RwLock<Network>>,
}

fn content_address(data: &[u8]) -> Result<Cid, StorageError> {
    let digest = Sha256::digest(data);
    let hash = Multihash::<64>::wrap(SHA2_256, &digest)
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
    Cid::new_v0(hash).map_err(|e| StorageError::Unavailable(e.to_string()))
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory node linking `children`, returning its identifier
    pub fn put_directory(
        &self,
        children: Vec<ChildDescriptor>,
        options: PutOptions,
    ) -> Result<Cid, StorageError> {
        let mut encoded = DIRECTORY_PREFIX.to_vec();
        for child in &children {
            encoded.extend_from_slice(child.name.as_bytes());
            encoded.push(0);
            encoded.extend_from_slice(&child.identifier.to_bytes());
        }
        let cid = content_address(&encoded)?;

        let mut network = self.inner.write();
        network.blocks.insert(cid, Node::Directory(children));
        if options.pin {
            network.pin(cid);
        }
        Ok(cid)
    }

    pub fn pin(&self, cid: &Cid) -> Result<(), StorageError> {
        let mut network = self.inner.write();
        if !network.blocks.contains_key(cid) {
            return Err(StorageError::NotFound(*cid));
        }
        network.pin(*cid);
        Ok(())
    }

    /// Drop a pin. The content stays readable until it is forgotten.
    pub fn unpin(&self, cid: &Cid) {
        self.inner.write().pins.retain(|p| p != cid);
    }

    /// Remove content entirely, as if garbage collected
    pub fn forget(&self, cid: &Cid) {
        let mut network = self.inner.write();
        network.blocks.remove(cid);
        network.pins.retain(|p| p != cid);
    }

    pub fn pinned(&self) -> Vec<Cid> {
        self.inner.read().pins.clone()
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.inner.read().blocks.contains_key(cid)
    }

    fn node(&self, cid: &Cid) -> Result<Node, StorageError> {
        self.inner
            .read()
            .blocks
            .get(cid)
            .cloned()
            .ok_or(StorageError::NotFound(*cid))
    }
}

#[async_trait]
impl StorageGateway for MemoryGateway {
    async fn put(
        &self,
        data: Bytes,
        options: PutOptions,
        _timeout: Duration,
    ) -> Result<Cid, StorageError> {
        let cid = content_address(&data)?;
        let mut network = self.inner.write();
        network.blocks.entry(cid).or_insert(Node::File(data));
        if options.pin {
            network.pin(cid);
        }
        tracing::trace!(%cid, pin = options.pin, "memory gateway put");
        Ok(cid)
    }

    async fn stat(&self, identifier: &Cid, _timeout: Duration) -> Result<Stat, StorageError> {
        Ok(Stat {
            size_bytes: self.node(identifier)?.size(),
        })
    }

    async fn list_pinned(&self, _timeout: Duration) -> Result<PinStream, StorageError> {
        let pins = self.pinned();
        Ok(Box::pin(stream::iter(pins.into_iter().map(Ok))))
    }

    async fn list_children(
        &self,
        identifier: &Cid,
        _timeout: Duration,
    ) -> Result<Vec<ChildDescriptor>, StorageError> {
        match self.node(identifier)? {
            Node::Directory(children) => Ok(children),
            Node::File(_) => Err(StorageError::NotADirectory(*identifier)),
        }
    }

    async fn read_at(
        &self,
        identifier: &Cid,
        offset: u64,
        length: u64,
        _timeout: Duration,
    ) -> Result<Bytes, StorageError> {
        match self.node(identifier)? {
            Node::File(data) => {
                let len = data.len() as u64;
                let start = offset.min(len);
                let end = offset.saturating_add(length).min(len);
                Ok(data.slice(start as usize..end as usize))
            }
            Node::Directory(_) => Err(StorageError::NotADirectory(*identifier)),
        }
    }
}

/// Describe `cid` as a file child named `name`, for building directories
pub fn file_child(name: &str, cid: Cid, size_bytes: u64) -> ChildDescriptor {
    ChildDescriptor {
        name: name.to_string(),
        identifier: cid,
        size_bytes,
        kind: ChildKind::File,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_put_and_read() {
        let gateway = MemoryGateway::new();
        let cid = gateway
            .put(Bytes::from_static(b"Hello, gateway!"), PutOptions::default(), T)
            .await
            .unwrap();

        let all = gateway.read_at(&cid, 0, 1024, T).await.unwrap();
        assert_eq!(all.as_ref(), b"Hello, gateway!");

        let middle = gateway.read_at(&cid, 7, 7, T).await.unwrap();
        assert_eq!(middle.as_ref(), b"gateway");

        let past_end = gateway.read_at(&cid, 100, 10, T).await.unwrap();
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_identical_bytes_same_identifier() {
        let gateway = MemoryGateway::new();
        let a = gateway
            .put(Bytes::from_static(b"same"), PutOptions::default(), T)
            .await
            .unwrap();
        let b = gateway
            .put(Bytes::from_static(b"same"), PutOptions::default(), T)
            .await
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(gateway.pinned(), vec![a]);
        assert!(a.to_string().starts_with("Qm"));
    }

    #[tokio::test]
    async fn test_unpinned_put() {
        let gateway = MemoryGateway::new();
        let cid = gateway
            .put(Bytes::from_static(b"loose"), PutOptions { pin: false }, T)
            .await
            .unwrap();
        assert!(gateway.contains(&cid));
        assert!(gateway.pinned().is_empty());

        gateway.pin(&cid).unwrap();
        let pins: Vec<_> = gateway
            .list_pinned(T)
            .await
            .unwrap()
            .collect::<Vec<_>>()
            .await;
        assert_eq!(pins.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_listing() {
        let gateway = MemoryGateway::new();
        let a = gateway
            .put(Bytes::from_static(b"aaaa"), PutOptions { pin: false }, T)
            .await
            .unwrap();
        let b = gateway
            .put(Bytes::from_static(b"bb"), PutOptions { pin: false }, T)
            .await
            .unwrap();
        let dir = gateway
            .put_directory(
                vec![file_child("a.txt", a, 4), file_child("b.txt", b, 2)],
                PutOptions::default(),
            )
            .unwrap();

        let children = gateway.list_children(&dir, T).await.unwrap();
        assert_eq!(children.len(), 2);
        assert_eq!(gateway.stat(&dir, T).await.unwrap().size_bytes, 6);

        assert!(matches!(
            gateway.list_children(&a, T).await,
            Err(StorageError::NotADirectory(_))
        ));
        assert!(matches!(
            gateway.read_at(&dir, 0, 10, T).await,
            Err(StorageError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_forget() {
        let gateway = MemoryGateway::new();
        let cid = gateway
            .put(Bytes::from_static(b"gone soon"), PutOptions::default(), T)
            .await
            .unwrap();
        gateway.forget(&cid);
        assert!(matches!(
            gateway.stat(&cid, T).await,
            Err(StorageError::NotFound(_))
        ));
        assert!(gateway.pinned().is_empty());
    }
}
