use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;

use super::state::{FailureReason, Outcome, Step, UploadFailure, UploadState};
use super::UploadRequest;
use crate::cost::{CostModel, CostQuote};
use crate::ledger::{AllocationLedger, TxRef};
use crate::record::FileRecord;
use crate::storage::{PutOptions, StorageGateway};

/// Log target for failures where the payer has been charged and got
///  nothing stored. Route this one to whoever handles refunds.
pub const PAYMENT_ALERT_TARGET: &str = "pinpay::payment_alert";

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub confirmation_timeout: Duration,
    pub consume_timeout: Duration,
    pub put_timeout: Duration,
    pub anchor_timeout: Duration,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            confirmation_timeout: Duration::from_secs(120),
            consume_timeout: Duration::from_secs(120),
            put_timeout: Duration::from_secs(60),
            anchor_timeout: Duration::from_secs(120),
        }
    }
}

/// Drives [`UploadState`] to a terminal state, one step at a time.
///
/// Holds long-lived handles to the ledger and storage network; each
///  call to [`Orchestrator::upload`] gets its own state machine, so any
///  number of uploads can run on one orchestrator at once.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    cost_model: CostModel,
    ledger: Arc<dyn AllocationLedger>,
    storage: Arc<dyn StorageGateway>,
    config: UploadConfig,
}

impl Orchestrator {
    pub fn new(
        cost_model: CostModel,
        ledger: Arc<dyn AllocationLedger>,
        storage: Arc<dyn StorageGateway>,
        config: UploadConfig,
    ) -> Self {
        Self {
            cost_model,
            ledger,
            storage,
            config,
        }
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost_model
    }

    pub fn ledger(&self) -> &Arc<dyn AllocationLedger> {
        &self.ledger
    }

    pub fn quote(&self, size_bytes: u64) -> CostQuote {
        self.cost_model.quote(size_bytes)
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<FileRecord, UploadFailure> {
        self.upload_until(request, std::future::pending()).await
    }

    /// Run an upload that stops early once `cancel` resolves.
    ///
    /// Cancelling before the payment is submitted costs nothing. Once
    ///  submitted, the ledger side is left alone and the failure reports
    ///  the dangling transaction.
    pub async fn upload_until<F>(
        &self,
        request: UploadRequest,
        cancel: F,
    ) -> Result<FileRecord, UploadFailure>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(cancel);

        let name = request.name.clone();
        let mut state = UploadState::new(request, &self.cost_model);
        if let UploadState::Idle { quote, .. } = &state {
            tracing::debug!(
                %name,
                size = quote.size_bytes,
                amount = %quote.required_payment_units,
                "upload starting"
            );
        }

        loop {
            let step = match state.next_step() {
                Some(step) => step,
                None => break,
            };

            let outcome = match step {
                Step::Persist => Outcome::Persisted {
                    created_at: Utc::now(),
                },
                // submission is not interruptible, so only check before it
                Step::Purchase { .. } => match (&mut cancel).now_or_never() {
                    Some(()) => Outcome::Cancelled,
                    None => self.perform(step).await,
                },
                step => {
                    tokio::select! {
                        biased;
                        _ = &mut cancel => Outcome::Cancelled,
                        outcome = self.perform(step) => outcome,
                    }
                }
            };

            let from = state.name();
            state = state.apply(outcome);
            tracing::debug!(%name, from, to = state.name(), "upload transition");
        }

        match state {
            UploadState::Persisted(record) => {
                tracing::info!(
                    name = %record.display_name,
                    identifier = %record.identifier,
                    size = record.size_bytes,
                    payment_tx = %record.payment_tx,
                    "upload persisted"
                );
                Ok(record)
            }
            UploadState::Failed(failure) => {
                report_failure(&name, &failure);
                Err(failure)
            }
            other => unreachable!("upload stopped in non-terminal state {}", other.name()),
        }
    }

    async fn perform(&self, step: Step) -> Outcome {
        match step {
            Step::Purchase { amount } => Outcome::Submitted(self.ledger.purchase(amount).await),
            Step::AwaitConfirmation { tx } => Outcome::Confirmed(
                self.ledger
                    .await_confirmation(&tx, self.config.confirmation_timeout)
                    .await,
            ),
            Step::ConsumeAllocation { size_units } => Outcome::Consumed(
                self.ledger
                    .consume_allocation(size_units, self.config.consume_timeout)
                    .await,
            ),
            Step::Put { content } => Outcome::Stored(
                self.storage
                    .put(content, PutOptions { pin: true }, self.config.put_timeout)
                    .await,
            ),
            Step::Persist => Outcome::Persisted {
                created_at: Utc::now(),
            },
        }
    }

    /// Record a persisted upload's identifier on the ledger.
    ///
    /// Runs after the upload is already final, so a failure here only
    ///  costs the on-ledger reference and is logged, not returned.
    pub async fn anchor(&self, record: &FileRecord) -> Option<TxRef> {
        match self
            .ledger
            .anchor_reference(&record.identifier, self.config.anchor_timeout)
            .await
        {
            Ok(tx) => {
                tracing::info!(identifier = %record.identifier, %tx, "reference anchored");
                Some(tx)
            }
            Err(err) => {
                tracing::warn!(identifier = %record.identifier, %err, "failed to anchor reference");
                None
            }
        }
    }
}

fn report_failure(name: &str, failure: &UploadFailure) {
    let payment_tx = failure
        .payment_tx
        .as_ref()
        .map(|tx| tx.to_string())
        .unwrap_or_default();

    match failure.reason {
        FailureReason::UploadFailedAfterPayment => tracing::error!(
            target: PAYMENT_ALERT_TARGET,
            %name,
            %payment_tx,
            message = %failure.message,
            "payment consumed but content was not stored"
        ),
        FailureReason::QuotaExceeded => tracing::warn!(
            %name,
            %payment_tx,
            message = %failure.message,
            "payment final but allocation could not be consumed"
        ),
        FailureReason::Cancelled if failure.funds_at_risk => tracing::warn!(
            %name,
            %payment_tx,
            "upload cancelled with a ledger transaction in flight"
        ),
        reason => tracing::info!(%name, ?reason, message = %failure.message, "upload abandoned"),
    }
}
