/**
 * Converting byte counts into the payment
 *  a storage allocation costs.
 */
pub mod cost;
/**
 * Rebuilding the browsable file index
 *  from whatever the storage network has pinned,
 *  degrading item by item rather than failing.
 */
pub mod index;
/**
 * The allocation ledger: buying storage allocation,
 *  waiting for it to become final and spending it.
 */
pub mod ledger;
pub mod record;
/**
 * Resolving one identifier to either a
 *  directory listing or a stream of its bytes.
 */
pub mod retrieval;
/**
 * Storage network access.
 *  A thin trait over a Kubo daemon, plus an
 *  in-memory network for development and tests.
 */
pub mod storage;
/**
 * The pay-then-pin upload state machine
 *  and the orchestrator that drives it.
 */
pub mod upload;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::cost::{CostModel, CostQuote};
    pub use crate::index::{IndexEntry, Reconciler, ReconcilerConfig};
    pub use crate::ledger::{AllocationLedger, AllocationReceipt, LedgerError, TxRef};
    pub use crate::record::{ContentKind, FileRecord};
    pub use crate::retrieval::{Resolved, Retrieval, RetrievalConfig};
    pub use crate::storage::{Cid, StorageError, StorageGateway};
    pub use crate::upload::{FailureReason, Orchestrator, UploadFailure, UploadRequest};
    pub use crate::version::build_info;
}
