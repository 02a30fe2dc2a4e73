//! Shared test doubles for the upload, reconcile and retrieval tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use common::cost::CostModel;
use common::ledger::{
    AllocationBalance, AllocationLedger, AllocationReceipt, LedgerError, TxRef,
};
use common::storage::{
    ChildDescriptor, Cid, MemoryGateway, PinStream, PutOptions, Stat, StorageError,
    StorageGateway,
};
use common::upload::{Orchestrator, UploadConfig};

pub const PAYER: &str = "0x00000000000000000000000000000000000000aa";

/// Which ledger calls should misbehave
#[derive(Debug, Clone, Default)]
pub struct LedgerScript {
    pub fail_purchase: bool,
    pub revert_confirmation: bool,
    pub fail_consume: bool,
    pub fail_anchor: bool,
    /// Applied to confirmation and consumption
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerCall {
    Purchase,
    AwaitConfirmation,
    Consume,
    Anchor,
}

/// A ledger that does what its script says and records every call
#[derive(Debug)]
pub struct ScriptedLedger {
    script: LedgerScript,
    calls: Mutex<Vec<LedgerCall>>,
    nonce: AtomicUsize,
}

impl ScriptedLedger {
    pub fn new(script: LedgerScript) -> Self {
        Self {
            script,
            calls: Mutex::new(Vec::new()),
            nonce: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().clone()
    }

    fn record(&self, call: LedgerCall) -> TxRef {
        self.calls.lock().push(call);
        let n = self.nonce.fetch_add(1, Ordering::SeqCst);
        TxRef::new(format!("0x{:064x}", n + 1))
    }
}

#[async_trait]
impl AllocationLedger for ScriptedLedger {
    fn payer(&self) -> &str {
        PAYER
    }

    async fn purchase(&self, _amount: u128) -> Result<TxRef, LedgerError> {
        let tx = self.record(LedgerCall::Purchase);
        if self.script.fail_purchase {
            return Err(LedgerError::Submission("nonce too low".to_string()));
        }
        Ok(tx)
    }

    async fn await_confirmation(
        &self,
        tx: &TxRef,
        _timeout: Duration,
    ) -> Result<AllocationReceipt, LedgerError> {
        self.record(LedgerCall::AwaitConfirmation);
        tokio::time::sleep(self.script.delay).await;
        if self.script.revert_confirmation {
            return Err(LedgerError::TransactionReverted {
                tx: Some(tx.clone()),
                reason: "execution reverted".to_string(),
            });
        }
        Ok(AllocationReceipt {
            payer: PAYER.to_string(),
            payment_tx: tx.clone(),
            confirmed_amount: 1_000_000,
            allocated_size_units: 1,
        })
    }

    async fn consume_allocation(
        &self,
        size_units: u64,
        _timeout: Duration,
    ) -> Result<TxRef, LedgerError> {
        let tx = self.record(LedgerCall::Consume);
        tokio::time::sleep(self.script.delay).await;
        if self.script.fail_consume {
            return Err(LedgerError::InsufficientAllocation {
                requested: size_units,
                available: 0,
            });
        }
        Ok(tx)
    }

    async fn balance(&self) -> Result<AllocationBalance, LedgerError> {
        Ok(AllocationBalance {
            payer: PAYER.to_string(),
            allocation_units: 0,
            funds: 0,
        })
    }

    async fn anchor_reference(
        &self,
        _identifier: &Cid,
        _timeout: Duration,
    ) -> Result<TxRef, LedgerError> {
        let tx = self.record(LedgerCall::Anchor);
        if self.script.fail_anchor {
            return Err(LedgerError::Unavailable("rpc down".to_string()));
        }
        Ok(tx)
    }
}

/// How one identifier misbehaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Every call about this identifier fails
    Broken,
    /// Only `stat` fails
    NoStat,
    /// Only `list_children` fails
    NoChildren,
    /// Every call about this identifier hangs this long first
    Slow(Duration),
}

/// Wraps a [`MemoryGateway`] and injects failures per identifier
#[derive(Debug, Default)]
pub struct FaultyGateway {
    pub inner: MemoryGateway,
    faults: Mutex<HashMap<Cid, Fault>>,
    fail_put: Mutex<bool>,
    put_delay: Mutex<Option<Duration>>,
    fail_listing: Mutex<bool>,
    extra_pins: Mutex<Vec<Cid>>,
    puts: AtomicUsize,
}

impl FaultyGateway {
    pub fn new(inner: MemoryGateway) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fault(&self, cid: Cid, fault: Fault) {
        self.faults.lock().insert(cid, fault);
    }

    pub fn fail_put(&self) {
        *self.fail_put.lock() = true;
    }

    /// Make every put hang for `delay` before it lands
    pub fn slow_put(&self, delay: Duration) {
        *self.put_delay.lock() = Some(delay);
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock() = true;
    }

    /// Report `cid` in the pin listing a second time
    pub fn duplicate_pin(&self, cid: Cid) {
        self.extra_pins.lock().push(cid);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    async fn check(&self, cid: &Cid, call: Fault) -> Result<(), StorageError> {
        let fault = self.faults.lock().get(cid).copied();
        match fault {
            Some(Fault::Broken) => Err(StorageError::Unavailable("injected".to_string())),
            Some(Fault::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(fault) if fault == call => {
                Err(StorageError::Unavailable("injected".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl StorageGateway for FaultyGateway {
    async fn put(
        &self,
        data: Bytes,
        options: PutOptions,
        timeout: Duration,
    ) -> Result<Cid, StorageError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.put_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_put.lock() {
            return Err(StorageError::Unavailable("daemon went away".to_string()));
        }
        self.inner.put(data, options, timeout).await
    }

    async fn stat(&self, identifier: &Cid, timeout: Duration) -> Result<Stat, StorageError> {
        self.check(identifier, Fault::NoStat).await?;
        self.inner.stat(identifier, timeout).await
    }

    async fn list_pinned(&self, _timeout: Duration) -> Result<PinStream, StorageError> {
        if *self.fail_listing.lock() {
            return Err(StorageError::Unavailable("pin listing failed".to_string()));
        }
        let mut pins = self.inner.pinned();
        pins.extend(self.extra_pins.lock().iter().copied());
        Ok(Box::pin(futures::stream::iter(pins.into_iter().map(Ok))))
    }

    async fn list_children(
        &self,
        identifier: &Cid,
        timeout: Duration,
    ) -> Result<Vec<ChildDescriptor>, StorageError> {
        self.check(identifier, Fault::NoChildren).await?;
        self.inner.list_children(identifier, timeout).await
    }

    async fn read_at(
        &self,
        identifier: &Cid,
        offset: u64,
        length: u64,
        timeout: Duration,
    ) -> Result<Bytes, StorageError> {
        self.check(identifier, Fault::Broken).await?;
        self.inner.read_at(identifier, offset, length, timeout).await
    }
}

pub fn orchestrator(
    ledger: Arc<dyn AllocationLedger>,
    storage: Arc<dyn StorageGateway>,
) -> Orchestrator {
    Orchestrator::new(
        CostModel::default(),
        ledger,
        storage,
        UploadConfig::default(),
    )
}
