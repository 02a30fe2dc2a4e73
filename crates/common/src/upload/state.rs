//! The per-upload state machine.
//!
//! [`UploadState`] is a tagged union of every point an upload can be at,
//!  [`UploadState::next_step`] names the single side effect that state
//!  needs, and [`UploadState::apply`] folds that effect's [`Outcome`] into
//!  the next state. Nothing in here touches the network, so every failure
//!  path can be driven directly.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UploadRequest;
use crate::cost::{CostModel, CostQuote};
use crate::ledger::{AllocationReceipt, LedgerError, TxRef};
use crate::record::{ContentKind, FileRecord};
use crate::storage::{Cid, StorageError};

/// Why an upload stopped short of `Persisted`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    PaymentSubmissionFailed,
    PaymentTimeout,
    PaymentRejected,
    QuotaExceeded,
    UploadFailedAfterPayment,
    Cancelled,
}

impl FailureReason {
    /// Nothing was spent: the whole upload can be retried from scratch
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureReason::PaymentSubmissionFailed
                | FailureReason::PaymentTimeout
                | FailureReason::PaymentRejected
        )
    }

    /// Payment reached finality but no content was stored for it
    pub fn funds_consumed(&self) -> bool {
        matches!(
            self,
            FailureReason::QuotaExceeded | FailureReason::UploadFailedAfterPayment
        )
    }
}

/// Terminal failure, carrying whatever ledger references exist so the
///  caller can reconcile a payment by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("upload failed ({reason:?}): {message}")]
pub struct UploadFailure {
    pub reason: FailureReason,
    pub message: String,
    pub payment_tx: Option<TxRef>,
    pub receipt: Option<AllocationReceipt>,
    /// A ledger transaction was submitted and may still settle
    pub funds_at_risk: bool,
}

/// The one side effect a state is waiting on
#[derive(Debug, Clone)]
pub enum Step {
    Purchase { amount: u128 },
    AwaitConfirmation { tx: TxRef },
    ConsumeAllocation { size_units: u64 },
    Put { content: Bytes },
    Persist,
}

/// Result of performing a [`Step`]
#[derive(Debug)]
pub enum Outcome {
    Submitted(Result<TxRef, LedgerError>),
    Confirmed(Result<AllocationReceipt, LedgerError>),
    Consumed(Result<TxRef, LedgerError>),
    Stored(Result<Cid, StorageError>),
    Persisted { created_at: DateTime<Utc> },
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum UploadState {
    Idle {
        request: UploadRequest,
        quote: CostQuote,
    },
    PaymentSubmitted {
        request: UploadRequest,
        quote: CostQuote,
        payment_tx: TxRef,
    },
    PaymentConfirmed {
        request: UploadRequest,
        quote: CostQuote,
        receipt: AllocationReceipt,
    },
    AllocationConsumed {
        request: UploadRequest,
        quote: CostQuote,
        receipt: AllocationReceipt,
        allocation_tx: TxRef,
    },
    ContentStored {
        request: UploadRequest,
        receipt: AllocationReceipt,
        allocation_tx: TxRef,
        identifier: Cid,
    },
    Persisted(FileRecord),
    Failed(UploadFailure),
}

impl UploadState {
    /// Start an upload, quoting it against `cost_model`
    pub fn new(request: UploadRequest, cost_model: &CostModel) -> Self {
        let quote = cost_model.quote(request.size_bytes());
        UploadState::Idle { request, quote }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UploadState::Idle { .. } => "idle",
            UploadState::PaymentSubmitted { .. } => "payment_submitted",
            UploadState::PaymentConfirmed { .. } => "payment_confirmed",
            UploadState::AllocationConsumed { .. } => "allocation_consumed",
            UploadState::ContentStored { .. } => "content_stored",
            UploadState::Persisted(_) => "persisted",
            UploadState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadState::Persisted(_) | UploadState::Failed(_))
    }

    pub fn next_step(&self) -> Option<Step> {
        match self {
            UploadState::Idle { quote, .. } => Some(Step::Purchase {
                amount: quote.required_payment_units,
            }),
            UploadState::PaymentSubmitted { payment_tx, .. } => Some(Step::AwaitConfirmation {
                tx: payment_tx.clone(),
            }),
            UploadState::PaymentConfirmed { quote, .. } => Some(Step::ConsumeAllocation {
                size_units: quote.size_units,
            }),
            UploadState::AllocationConsumed { request, .. } => Some(Step::Put {
                content: request.content.clone(),
            }),
            UploadState::ContentStored { .. } => Some(Step::Persist),
            UploadState::Persisted(_) | UploadState::Failed(_) => None,
        }
    }

    /// Fold `outcome` into the next state.
    ///
    /// Terminal states absorb every outcome. An outcome that does not
    ///  belong to the current state ends the upload as cancelled rather
    ///  than re-running a step.
    pub fn apply(self, outcome: Outcome) -> UploadState {
        use UploadState::*;

        match (self, outcome) {
            (state @ (Persisted(_) | Failed(_)), _) => state,

            (Idle { request, quote }, Outcome::Submitted(Ok(payment_tx))) => PaymentSubmitted {
                request,
                quote,
                payment_tx,
            },
            (Idle { .. }, Outcome::Submitted(Err(err))) => Failed(UploadFailure {
                reason: FailureReason::PaymentSubmissionFailed,
                message: err.to_string(),
                payment_tx: None,
                receipt: None,
                funds_at_risk: false,
            }),

            (
                PaymentSubmitted { request, quote, .. },
                Outcome::Confirmed(Ok(receipt)),
            ) => PaymentConfirmed {
                request,
                quote,
                receipt,
            },
            (PaymentSubmitted { payment_tx, .. }, Outcome::Confirmed(Err(err))) => {
                let reason = match err {
                    LedgerError::TransactionReverted { .. } | LedgerError::UnknownTransaction(_) => {
                        FailureReason::PaymentRejected
                    }
                    _ => FailureReason::PaymentTimeout,
                };
                Failed(UploadFailure {
                    reason,
                    message: err.to_string(),
                    // a timed out payment may still land
                    funds_at_risk: reason == FailureReason::PaymentTimeout,
                    payment_tx: Some(payment_tx),
                    receipt: None,
                })
            }

            (
                PaymentConfirmed {
                    request,
                    quote,
                    receipt,
                },
                Outcome::Consumed(Ok(allocation_tx)),
            ) => AllocationConsumed {
                request,
                quote,
                receipt,
                allocation_tx,
            },
            (PaymentConfirmed { receipt, .. }, Outcome::Consumed(Err(err))) => {
                Failed(UploadFailure {
                    reason: FailureReason::QuotaExceeded,
                    message: err.to_string(),
                    payment_tx: Some(receipt.payment_tx.clone()),
                    receipt: Some(receipt),
                    funds_at_risk: true,
                })
            }

            (
                AllocationConsumed {
                    request,
                    receipt,
                    allocation_tx,
                    ..
                },
                Outcome::Stored(Ok(identifier)),
            ) => ContentStored {
                request,
                receipt,
                allocation_tx,
                identifier,
            },
            (AllocationConsumed { receipt, .. }, Outcome::Stored(Err(err))) => {
                Failed(UploadFailure {
                    reason: FailureReason::UploadFailedAfterPayment,
                    message: err.to_string(),
                    payment_tx: Some(receipt.payment_tx.clone()),
                    receipt: Some(receipt),
                    funds_at_risk: true,
                })
            }

            (
                ContentStored {
                    request,
                    receipt,
                    allocation_tx,
                    identifier,
                },
                Outcome::Persisted { created_at },
            ) => Persisted(FileRecord {
                identifier,
                size_bytes: request.size_bytes(),
                kind: ContentKind::File(request.mime.clone()),
                display_name: request.name,
                created_at,
                payment_tx: receipt.payment_tx.clone(),
                allocation_tx,
                receipt,
            }),

            (state, outcome) => {
                let message = match outcome {
                    Outcome::Cancelled => format!("cancelled in state {}", state.name()),
                    other => format!("unexpected outcome {:?} in state {}", other, state.name()),
                };
                Failed(state.interrupted(message))
            }
        }
    }

    /// Failure for an upload stopped from outside at its current state.
    ///
    /// Only an upload whose payment has not reached finality counts as
    ///  cancelled. Past that point the stop is reported in the same class
    ///  as a ledger or storage failure at that step.
    fn interrupted(self, message: String) -> UploadFailure {
        let (reason, payment_tx, receipt) = match self {
            UploadState::Idle { .. } | UploadState::Persisted(_) | UploadState::Failed(_) => {
                (FailureReason::Cancelled, None, None)
            }
            UploadState::PaymentSubmitted { payment_tx, .. } => {
                (FailureReason::Cancelled, Some(payment_tx), None)
            }
            // the allocation spend may already be in flight
            UploadState::PaymentConfirmed { receipt, .. } => (
                FailureReason::QuotaExceeded,
                Some(receipt.payment_tx.clone()),
                Some(receipt),
            ),
            UploadState::AllocationConsumed { receipt, .. }
            | UploadState::ContentStored { receipt, .. } => (
                FailureReason::UploadFailedAfterPayment,
                Some(receipt.payment_tx.clone()),
                Some(receipt),
            ),
        };
        UploadFailure {
            reason,
            message,
            funds_at_risk: payment_tx.is_some(),
            payment_tx,
            receipt,
        }
    }
}
