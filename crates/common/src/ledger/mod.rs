//! The payment / allocation capability of the storage contract.
//!
//! Nothing in here retries a mutation. Submitting a purchase twice is a
//!  double charge, so that decision always belongs to the caller.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cost::amount_string;
use crate::storage::Cid;

mod memory;

pub use memory::{MemoryLedger, MemoryLedgerConfig};

/// Reference to a submitted ledger transaction (its hash)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof that a purchase reached finality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReceipt {
    pub payer: String,
    pub payment_tx: TxRef,
    #[serde(with = "amount_string")]
    pub confirmed_amount: u128,
    pub allocated_size_units: u64,
}

/// What the payer currently holds on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationBalance {
    pub payer: String,
    pub allocation_units: u64,
    #[serde(with = "amount_string")]
    pub funds: u128,
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("transaction could not be submitted: {0}")]
    Submission(String),
    #[error("transaction {tx} not confirmed within {timeout:?}")]
    TransactionTimeout { tx: TxRef, timeout: Duration },
    #[error("transaction reverted: {reason}")]
    TransactionReverted { tx: Option<TxRef>, reason: String },
    #[error("insufficient allocation: requested {requested} units, {available} available")]
    InsufficientAllocation { requested: u64, available: u64 },
    #[error("unknown transaction: {0}")]
    UnknownTransaction(TxRef),
    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Narrow view of the payment contract: buy allocation, spend it,
///  look at what is left, and optionally record a content reference.
#[async_trait]
pub trait AllocationLedger: Send + Sync + fmt::Debug {
    /// Identity (address) that pays for and owns allocations
    fn payer(&self) -> &str;

    /// Submit a payment of `amount` base units.
    ///  Returns once the transaction is submitted, not confirmed.
    async fn purchase(&self, amount: u128) -> Result<TxRef, LedgerError>;

    /// Wait for `tx` to reach finality
    async fn await_confirmation(
        &self,
        tx: &TxRef,
        timeout: Duration,
    ) -> Result<AllocationReceipt, LedgerError>;

    /// Spend `size_units` of purchased allocation, waiting for the
    ///  spend itself to confirm
    async fn consume_allocation(
        &self,
        size_units: u64,
        timeout: Duration,
    ) -> Result<TxRef, LedgerError>;

    async fn balance(&self) -> Result<AllocationBalance, LedgerError>;

    /// Record `identifier` against the payer on the ledger
    async fn anchor_reference(
        &self,
        identifier: &Cid,
        timeout: Duration,
    ) -> Result<TxRef, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_json_shape() {
        let receipt = AllocationReceipt {
            payer: "0xabc".to_string(),
            payment_tx: TxRef::new("0x01"),
            confirmed_amount: 340_282_366_920_938_463_463_374_607_431_768_211_455,
            allocated_size_units: 4,
        };
        let json = serde_json::to_value(&receipt).unwrap();
        assert_eq!(json["payment_tx"], "0x01");
        assert_eq!(
            json["confirmed_amount"],
            "340282366920938463463374607431768211455"
        );
    }
}
