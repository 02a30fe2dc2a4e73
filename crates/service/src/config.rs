use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use common::cost::{amount_string, CostModel, DEFAULT_MINIMUM_PAYMENT, DEFAULT_PRICE_PER_KB};
use common::index::{ReconcilerConfig, SNIFF_LENGTH};
use common::ledger::MemoryLedgerConfig;
use common::upload::UploadConfig;

const DEFAULT_API_PORT: u16 = 3001;
const DEFAULT_PUBLIC_GATEWAY: &str = "http://127.0.0.1:8080/ipfs";
const DEFAULT_KUBO_API: &str = "http://127.0.0.1:5001";
const CONFIG_DIR: &str = ".pinpay";
const CONFIG_FILE: &str = "config.toml";

/// Maximum upload size in bytes (500 MB)
pub const MAX_UPLOAD_SIZE_BYTES: usize = 500 * 1024 * 1024;

/// Everything the service needs to start.
///  Every field has a default, so an empty file is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// address for the API server to listen on
    pub listen_addr: SocketAddr,
    pub log_level: String,
    /// base of the public gateway links handed back to uploaders
    pub public_gateway_url: Url,
    pub max_upload_bytes: usize,

    pub storage: StorageConfig,
    pub ledger: LedgerConfig,
    pub pricing: PricingConfig,
    pub upload: UploadSettings,
    pub index: IndexSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_API_PORT),
            log_level: "info".to_string(),
            public_gateway_url: Url::parse(DEFAULT_PUBLIC_GATEWAY)
                .expect("default gateway url is valid"),
            max_upload_bytes: MAX_UPLOAD_SIZE_BYTES,
            storage: StorageConfig::default(),
            ledger: LedgerConfig::default(),
            pricing: PricingConfig::default(),
            upload: UploadSettings::default(),
            index: IndexSettings::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&raw)?)
    }

    /// Load `path` if given, else `~/.pinpay/config.toml` if it exists,
    ///  else the defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        self.log_level
            .parse()
            .map_err(|_| ConfigError::InvalidLogLevel(self.log_level.clone()))
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Which storage network to talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// A Kubo daemon's RPC API
    Kubo { api_url: Url },
    /// An in-process network that forgets everything on exit
    Memory,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Kubo {
            api_url: Url::parse(DEFAULT_KUBO_API).expect("default kubo url is valid"),
        }
    }
}

/// Settings for the in-process dev ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub payer: String,
    pub confirmation_delay_ms: u64,
    #[serde(with = "amount_string")]
    pub initial_balance: u128,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        let dev = MemoryLedgerConfig::default();
        Self {
            payer: dev.payer,
            confirmation_delay_ms: dev.confirmation_delay.as_millis() as u64,
            initial_balance: dev.initial_funds,
        }
    }
}

impl LedgerConfig {
    pub fn memory_ledger(&self, price_per_kb: u128) -> MemoryLedgerConfig {
        MemoryLedgerConfig {
            payer: self.payer.clone(),
            initial_funds: self.initial_balance,
            price_per_kb,
            confirmation_delay: Duration::from_millis(self.confirmation_delay_ms),
        }
    }
}

/// Prices in integer base units of the ledger currency
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    #[serde(with = "amount_string")]
    pub price_per_kb: u128,
    #[serde(with = "amount_string")]
    pub minimum_payment: u128,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            price_per_kb: DEFAULT_PRICE_PER_KB,
            minimum_payment: DEFAULT_MINIMUM_PAYMENT,
        }
    }
}

impl From<&PricingConfig> for CostModel {
    fn from(pricing: &PricingConfig) -> Self {
        CostModel::new(pricing.price_per_kb, pricing.minimum_payment)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// bound on waiting for the payment and the allocation spend
    pub confirmation_timeout_secs: u64,
    pub put_timeout_secs: u64,
    /// record each persisted identifier on the ledger
    pub anchor_references: bool,
}

impl Default for UploadSettings {
    fn default() -> Self {
        let defaults = UploadConfig::default();
        Self {
            confirmation_timeout_secs: defaults.confirmation_timeout.as_secs(),
            put_timeout_secs: defaults.put_timeout.as_secs(),
            anchor_references: false,
        }
    }
}

impl From<&UploadSettings> for UploadConfig {
    fn from(settings: &UploadSettings) -> Self {
        let confirmation = Duration::from_secs(settings.confirmation_timeout_secs);
        UploadConfig {
            confirmation_timeout: confirmation,
            consume_timeout: confirmation,
            put_timeout: Duration::from_secs(settings.put_timeout_secs),
            anchor_timeout: confirmation,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub concurrency: usize,
    pub list_timeout_ms: u64,
    pub stat_timeout_ms: u64,
    pub peek_timeout_ms: u64,
    pub peek_bytes: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            list_timeout_ms: 10_000,
            stat_timeout_ms: 1_000,
            peek_timeout_ms: 1_000,
            peek_bytes: SNIFF_LENGTH,
        }
    }
}

impl From<&IndexSettings> for ReconcilerConfig {
    fn from(settings: &IndexSettings) -> Self {
        let probe = Duration::from_millis(settings.peek_timeout_ms);
        ReconcilerConfig {
            concurrency: settings.concurrency,
            list_timeout: Duration::from_millis(settings.list_timeout_ms),
            stat_timeout: Duration::from_millis(settings.stat_timeout_ms),
            children_timeout: probe,
            peek_timeout: probe,
            peek_length: settings.peek_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid log level: {0}")]
    InvalidLogLevel(String),
}
