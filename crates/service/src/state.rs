use std::sync::Arc;

use url::Url;

use common::cost::CostModel;
use common::index::{Reconciler, ReconcilerConfig};
use common::ledger::{AllocationLedger, MemoryLedger};
use common::retrieval::{Retrieval, RetrievalConfig};
use common::storage::{KuboGateway, MemoryGateway, StorageError, StorageGateway};
use common::upload::{Orchestrator, UploadConfig};

use super::config::{Config, StorageConfig};

/// Long-lived handles shared by every request.
///
/// The adapters are built once and injected into the orchestrator,
///  reconciler and retrieval gateway; cloning the state is cheap.
#[derive(Debug, Clone)]
pub struct State {
    orchestrator: Orchestrator,
    reconciler: Reconciler,
    retrieval: Retrieval,
    storage: Arc<dyn StorageGateway>,
    public_gateway_url: Url,
    anchor_references: bool,
}

impl State {
    pub fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Storage network
        let storage: Arc<dyn StorageGateway> = match &config.storage {
            StorageConfig::Kubo { api_url } => {
                tracing::info!(%api_url, "using kubo storage network");
                Arc::new(KuboGateway::new(api_url)?)
            }
            StorageConfig::Memory => {
                tracing::warn!("using in-memory storage network, content is lost on exit");
                Arc::new(MemoryGateway::new())
            }
        };

        // 2. Ledger
        let cost_model = CostModel::from(&config.pricing);
        let ledger = MemoryLedger::new(config.ledger.memory_ledger(cost_model.price_per_kb));
        tracing::info!(payer = ledger.payer(), "using dev ledger");

        Ok(Self::new(cost_model, Arc::new(ledger), storage, config))
    }

    /// Wire up state around already-built adapters
    pub fn new(
        cost_model: CostModel,
        ledger: Arc<dyn AllocationLedger>,
        storage: Arc<dyn StorageGateway>,
        config: &Config,
    ) -> Self {
        let orchestrator = Orchestrator::new(
            cost_model,
            ledger,
            storage.clone(),
            UploadConfig::from(&config.upload),
        );
        let reconciler = Reconciler::new(storage.clone(), ReconcilerConfig::from(&config.index));
        let retrieval = Retrieval::new(storage.clone(), RetrievalConfig::default());

        Self {
            orchestrator,
            reconciler,
            retrieval,
            storage,
            public_gateway_url: config.public_gateway_url.clone(),
            anchor_references: config.upload.anchor_references,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn retrieval(&self) -> &Retrieval {
        &self.retrieval
    }

    pub fn storage(&self) -> &Arc<dyn StorageGateway> {
        &self.storage
    }

    pub fn ledger(&self) -> &Arc<dyn AllocationLedger> {
        self.orchestrator.ledger()
    }

    pub fn public_gateway_url(&self) -> &Url {
        &self.public_gateway_url
    }

    pub fn anchor_references(&self) -> bool {
        self.anchor_references
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("storage setup error: {0}")]
    Storage(#[from] StorageError),
}
