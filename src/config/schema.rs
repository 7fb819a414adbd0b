//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::chain::types::{Address, ChainResult};

/// Root configuration for the distribution service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Access node connection and transaction settings.
    pub chain: ChainConfig,

    /// Custodial service account.
    pub account: AccountConfig,

    /// Deployed contract locations.
    pub contracts: ContractsConfig,

    /// Reconciliation ticker.
    pub poller: PollerConfig,

    /// Batch sizes and polling windows.
    pub batching: BatchConfig,

    /// Persistence settings.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Enable chain integration. When disabled the no-op contract is used.
    pub enabled: bool,

    /// Access node REST endpoint.
    pub access_api_url: String,

    /// Failover access node endpoints.
    pub failover_urls: Vec<String>,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Computation limit attached to every transaction.
    pub gas_limit: u64,

    /// Upper bound on waiting for a synchronous transaction to seal.
    pub seal_timeout_secs: u64,

    /// Base delay between seal polls in milliseconds.
    pub seal_poll_base_ms: u64,

    /// Maximum delay between seal polls in milliseconds.
    pub seal_poll_max_ms: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            access_api_url: "http://localhost:8888".to_string(),
            failover_urls: Vec::new(),
            rpc_timeout_secs: 10,
            gas_limit: 9999,
            seal_timeout_secs: 60,
            seal_poll_base_ms: 500,
            seal_poll_max_ms: 5000,
        }
    }
}

/// Service account acting as proposer, payer, authorizer and escrow.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Account address (0x-prefixed hex).
    pub address: String,

    /// Key indexes rotated as proposal keys.
    pub key_indexes: Vec<u32>,

    /// Environment variable holding the hex private key.
    pub private_key_env: String,
}

impl AccountConfig {
    pub fn address(&self) -> ChainResult<Address> {
        self.address.parse()
    }
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            address: "0xf8d6e0586b0a20c7".to_string(),
            key_indexes: vec![0],
            private_key_env: "PDS_ACCOUNT_PRIVATE_KEY".to_string(),
        }
    }
}

/// Locations of the contracts the service scripts import.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContractsConfig {
    /// Address of the distribution registry contract.
    pub pds_address: String,

    /// Name of the distribution registry contract.
    pub pds_name: String,

    /// Address of the NonFungibleToken standard interface.
    pub non_fungible_token_address: String,
}

impl ContractsConfig {
    pub fn pds_address(&self) -> ChainResult<Address> {
        self.pds_address.parse()
    }

    pub fn non_fungible_token_address(&self) -> ChainResult<Address> {
        self.non_fungible_token_address.parse()
    }
}

impl Default for ContractsConfig {
    fn default() -> Self {
        Self {
            pds_address: "0xf8d6e0586b0a20c7".to_string(),
            pds_name: "PDS".to_string(),
            non_fungible_token_address: "0xf8d6e0586b0a20c7".to_string(),
        }
    }
}

/// Reconciliation ticker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Run reconciliation tasks.
    pub enabled: bool,

    /// Tick interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 5000,
        }
    }
}

/// Batch sizes and polling windows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Packs per escrow settlement batch.
    pub settlement_batch_size: usize,

    /// Packs per mint transaction.
    pub mint_batch_size: usize,

    /// Rows per bulk insert statement.
    pub insert_batch_size: usize,

    /// Maximum block span examined per status check.
    pub max_blocks_per_check: u64,

    /// Outbox rows handled per submitter/checker pass.
    pub outbox_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            settlement_batch_size: 40,
            mint_batch_size: 40,
            insert_batch_size: 1000,
            // Access nodes serve at most 250 heights per event query.
            max_blocks_per_check: 249,
            outbox_batch_size: 10,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file written on every commit.
    pub snapshot_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
