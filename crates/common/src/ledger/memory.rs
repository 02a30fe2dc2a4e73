use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::{AllocationBalance, AllocationLedger, AllocationReceipt, LedgerError, TxRef};
use crate::cost::DEFAULT_PRICE_PER_KB;
use crate::storage::Cid;

/// Settings for the in-process dev ledger
#[derive(Debug, Clone)]
pub struct MemoryLedgerConfig {
    pub payer: String,
    pub initial_funds: u128,
    /// Allocation credited per KB paid for
    pub price_per_kb: u128,
    /// How long a submitted transaction takes to reach finality
    pub confirmation_delay: Duration,
}

impl Default for MemoryLedgerConfig {
    fn default() -> Self {
        Self {
            payer: "0x0000000000000000000000000000000000000001".to_string(),
            // 1 coin
            initial_funds: 1_000_000_000_000_000_000,
            price_per_kb: DEFAULT_PRICE_PER_KB,
            confirmation_delay: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone)]
enum TxKind {
    Purchase { amount: u128 },
    Consume,
    Anchor,
}

#[derive(Debug, Clone)]
struct Transaction {
    kind: TxKind,
    final_at: Instant,
    receipt: Option<AllocationReceipt>,
}

#[derive(Debug)]
struct Book {
    funds: u128,
    allocation_units: u64,
    nonce: u64,
    transactions: HashMap<TxRef, Transaction>,
    anchors: Vec<(Cid, TxRef)>,
}

/// A dev stand-in for the storage payment contract.
///
/// `purchase` escrows funds immediately and credits allocation
///  (`amount / price_per_kb` KB) once the transaction is final.
///  `consume_allocation` reverts when the payer holds too little.
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    config: Arc<MemoryLedgerConfig>,
    book: Arc<Mutex<Book>>,
}

impl MemoryLedger {
    pub fn new(config: MemoryLedgerConfig) -> Self {
        let book = Book {
            funds: config.initial_funds,
            allocation_units: 0,
            nonce: 0,
            transactions: HashMap::new(),
            anchors: Vec::new(),
        };
        Self {
            config: Arc::new(config),
            book: Arc::new(Mutex::new(book)),
        }
    }

    /// References anchored so far, oldest first
    pub fn anchors(&self) -> Vec<(Cid, TxRef)> {
        self.book.lock().anchors.clone()
    }

    fn submit(&self, book: &mut Book, kind: TxKind) -> TxRef {
        book.nonce += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.config.payer.as_bytes());
        hasher.update(book.nonce.to_be_bytes());
        let tx = TxRef::new(format!("0x{}", hex::encode(hasher.finalize())));

        book.transactions.insert(
            tx.clone(),
            Transaction {
                kind,
                final_at: Instant::now() + self.config.confirmation_delay,
                receipt: None,
            },
        );
        tx
    }

    async fn wait_final(&self, tx: &TxRef, timeout: Duration) -> Result<(), LedgerError> {
        let final_at = self
            .book
            .lock()
            .transactions
            .get(tx)
            .map(|t| t.final_at)
            .ok_or_else(|| LedgerError::UnknownTransaction(tx.clone()))?;

        let deadline = Instant::now() + timeout;
        if final_at > deadline {
            tokio::time::sleep_until(deadline).await;
            return Err(LedgerError::TransactionTimeout {
                tx: tx.clone(),
                timeout,
            });
        }
        tokio::time::sleep_until(final_at).await;
        Ok(())
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new(MemoryLedgerConfig::default())
    }
}

#[async_trait]
impl AllocationLedger for MemoryLedger {
    fn payer(&self) -> &str {
        &self.config.payer
    }

    async fn purchase(&self, amount: u128) -> Result<TxRef, LedgerError> {
        let mut book = self.book.lock();
        if amount > book.funds {
            return Err(LedgerError::Submission(format!(
                "insufficient funds: {} requested, {} held",
                amount, book.funds
            )));
        }
        book.funds -= amount;
        let tx = self.submit(&mut book, TxKind::Purchase { amount });
        tracing::debug!(%tx, amount, "dev ledger: purchase submitted");
        Ok(tx)
    }

    async fn await_confirmation(
        &self,
        tx: &TxRef,
        timeout: Duration,
    ) -> Result<AllocationReceipt, LedgerError> {
        self.wait_final(tx, timeout).await?;

        let mut book = self.book.lock();
        let price_per_kb = self.config.price_per_kb.max(1);
        let transaction = book
            .transactions
            .get_mut(tx)
            .ok_or_else(|| LedgerError::UnknownTransaction(tx.clone()))?;

        if let Some(receipt) = &transaction.receipt {
            return Ok(receipt.clone());
        }
        let amount = match transaction.kind {
            TxKind::Purchase { amount } => amount,
            _ => {
                return Err(LedgerError::TransactionReverted {
                    tx: Some(tx.clone()),
                    reason: "not a purchase".to_string(),
                })
            }
        };

        let allocated = u64::try_from(amount / price_per_kb).unwrap_or(u64::MAX);
        let receipt = AllocationReceipt {
            payer: self.config.payer.clone(),
            payment_tx: tx.clone(),
            confirmed_amount: amount,
            allocated_size_units: allocated,
        };
        transaction.receipt = Some(receipt.clone());
        book.allocation_units = book.allocation_units.saturating_add(allocated);
        tracing::debug!(%tx, allocated, "dev ledger: purchase final");
        Ok(receipt)
    }

    async fn consume_allocation(
        &self,
        size_units: u64,
        timeout: Duration,
    ) -> Result<TxRef, LedgerError> {
        let tx = {
            let mut book = self.book.lock();
            if size_units > book.allocation_units {
                return Err(LedgerError::InsufficientAllocation {
                    requested: size_units,
                    available: book.allocation_units,
                });
            }
            book.allocation_units -= size_units;
            self.submit(&mut book, TxKind::Consume)
        };
        self.wait_final(&tx, timeout).await?;
        tracing::debug!(%tx, size_units, "dev ledger: allocation consumed");
        Ok(tx)
    }

    async fn balance(&self) -> Result<AllocationBalance, LedgerError> {
        let book = self.book.lock();
        Ok(AllocationBalance {
            payer: self.config.payer.clone(),
            allocation_units: book.allocation_units,
            funds: book.funds,
        })
    }

    async fn anchor_reference(
        &self,
        identifier: &Cid,
        timeout: Duration,
    ) -> Result<TxRef, LedgerError> {
        let tx = self.submit(&mut self.book.lock(), TxKind::Anchor);
        self.wait_final(&tx, timeout).await?;
        self.book.lock().anchors.push((*identifier, tx.clone()));
        Ok(tx)
    }
}
