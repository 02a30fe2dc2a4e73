//! Rebuilding the file index from what the storage network has pinned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::{future, FutureExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::record::{synthesize_name, ContentKind};
use crate::storage::{cid_string, with_timeout, Cid, StorageError, StorageGateway};

mod classify;

pub use classify::{sniff, Probe, Signature, DEFAULT_PROBES, SIGNATURES, SNIFF_LENGTH};

/// One row of the reconciled index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    #[serde(with = "cid_string")]
    pub identifier: Cid,
    pub size_bytes: u64,
    pub kind: ContentKind,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Items probed at once
    pub concurrency: usize,
    pub list_timeout: Duration,
    pub stat_timeout: Duration,
    pub children_timeout: Duration,
    pub peek_timeout: Duration,
    pub peek_length: u64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            list_timeout: Duration::from_secs(10),
            stat_timeout: Duration::from_millis(1000),
            children_timeout: Duration::from_millis(1000),
            peek_timeout: Duration::from_millis(1000),
            peek_length: SNIFF_LENGTH,
        }
    }
}

/// Builds [`IndexEntry`]s for every pinned identifier.
///
/// Only the pin listing itself can fail a pass. Each item's metadata
///  calls are bounded by their own timeouts and degrade to a zero size
///  or an `unknown` kind instead of erroring, so one slow or broken
///  item never holds up or sinks the rest.
#[derive(Debug, Clone)]
pub struct Reconciler {
    storage: Arc<dyn StorageGateway>,
    config: ReconcilerConfig,
    probes: Vec<Probe>,
}

impl Reconciler {
    pub fn new(storage: Arc<dyn StorageGateway>, config: ReconcilerConfig) -> Self {
        Self {
            storage,
            config,
            probes: DEFAULT_PROBES.to_vec(),
        }
    }

    /// Replace the classification probes, tried in the given order
    pub fn with_probes(mut self, probes: Vec<Probe>) -> Self {
        self.probes = probes;
        self
    }

    /// Run one reconciliation pass.
    ///
    /// Entries come back in completion order, one per distinct
    ///  pinned identifier.
    pub async fn reconcile(&self) -> Result<Vec<IndexEntry>, StorageError> {
        let pins = self.storage.list_pinned(self.config.list_timeout).await?;

        let mut seen = HashSet::new();
        let entries: Vec<IndexEntry> = pins
            .try_filter(move |cid| future::ready(seen.insert(*cid)))
            .map_ok(|cid| self.index_one(cid).map(Ok::<_, StorageError>))
            .try_buffer_unordered(self.config.concurrency.max(1))
            .try_collect()
            .await?;

        let degraded = entries
            .iter()
            .filter(|entry| entry.kind == ContentKind::Unknown)
            .count();
        tracing::info!(entries = entries.len(), degraded, "index reconciled");

        Ok(entries)
    }

    /// Build the entry for a single identifier. Never fails.
    pub async fn index_one(&self, identifier: Cid) -> IndexEntry {
        let timeout = self.config.stat_timeout;
        let size_bytes = match with_timeout(timeout, self.storage.stat(&identifier, timeout)).await
        {
            Ok(stat) => stat.size_bytes,
            Err(err) => {
                tracing::debug!(%identifier, %err, "stat failed, indexing with zero size");
                0
            }
        };

        let kind = self.classify(&identifier).await;
        IndexEntry {
            display_name: synthesize_name(&identifier, &kind),
            identifier,
            size_bytes,
            kind,
        }
    }

    /// Try each probe in order; `unknown` if none of them answers
    pub async fn classify(&self, identifier: &Cid) -> ContentKind {
        for probe in &self.probes {
            if let Some(kind) = self.run_probe(*probe, identifier).await {
                return kind;
            }
        }
        tracing::debug!(%identifier, "no probe could classify content");
        ContentKind::Unknown
    }

    async fn run_probe(&self, probe: Probe, identifier: &Cid) -> Option<ContentKind> {
        match probe {
            Probe::Directory => {
                let timeout = self.config.children_timeout;
                match with_timeout(timeout, self.storage.list_children(identifier, timeout)).await {
                    Ok(children) if !children.is_empty() => Some(ContentKind::Directory),
                    Ok(_) => None,
                    Err(err) => {
                        tracing::trace!(%identifier, %err, "directory probe failed");
                        None
                    }
                }
            }
            Probe::MagicNumber => {
                let timeout = self.config.peek_timeout;
                let peek = self
                    .storage
                    .peek_bytes(identifier, self.config.peek_length, timeout);
                match with_timeout(timeout, peek).await {
                    Ok(prefix) => Some(
                        sniff(&prefix)
                            .map(ContentKind::File)
                            .unwrap_or_else(ContentKind::binary),
                    ),
                    Err(err) => {
                        tracing::trace!(%identifier, %err, "magic number probe failed");
                        None
                    }
                }
            }
        }
    }
}
