//! Node configuration tree.
//!
//! Mirrors the external camelCase key layout consumed from config files.
//! Every section has defaults so a bare config still boots a working node.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::constants::{
    BLOCK_TIME_SECS, COINBASE_REWARD, DIFFICULTY_MINIMUM, DIFFICULTY_WINDOW, MIN_TX_FEE,
    SPAM_MAX_GLOBAL, SPAM_MAX_PER_SENDER,
};
use crate::mempool::MempoolLimits;
use crate::spam::SpamPolicy;
use crate::types::{Algorithm, Hash256};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainConfig {
    pub blockchain: BlockchainConfig,
    pub spam_protection: SpamProtectionConfig,
    pub memory: MemoryConfig,
    pub batch_processing: BatchProcessingConfig,
    pub wallet: WalletConfig,
    pub storage: StorageConfig,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BlockchainConfig {
    /// Target block spacing in seconds.
    pub block_time: u64,
    /// Coinbase reward per block, in motes.
    pub coinbase_reward: u64,
    pub difficulty_algorithm: Algorithm,
    /// Trailing window size for difficulty retargeting.
    pub difficulty_blocks: u64,
    /// Retarget floor.
    pub difficulty_minimum: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genesis: Option<GenesisConfig>,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            block_time: BLOCK_TIME_SECS,
            coinbase_reward: COINBASE_REWARD,
            difficulty_algorithm: Algorithm::Kawpow,
            difficulty_blocks: DIFFICULTY_WINDOW,
            difficulty_minimum: DIFFICULTY_MINIMUM,
            genesis: None,
        }
    }
}

/// Trusted genesis parameters.
///
/// When `hash` is present it is adopted verbatim (genesis has trusted
/// provenance); otherwise the hash is computed from the assembled block.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenesisConfig {
    /// Unix milliseconds.
    pub timestamp: u64,
    pub difficulty: u64,
    /// Initial endowment in motes.
    pub premine_amount: u64,
    pub premine_address: Address,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<Hash256>,
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase_nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase_atomic_sequence: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SpamProtectionConfig {
    /// Per-sender admissions per rolling minute.
    pub max_transactions_per_address: u32,
    /// Global admissions per rolling minute.
    pub max_transactions_per_minute: u32,
    /// Sender ban duration in seconds.
    pub address_ban_duration: u64,
}

impl Default for SpamProtectionConfig {
    fn default() -> Self {
        Self {
            max_transactions_per_address: SPAM_MAX_PER_SENDER,
            max_transactions_per_minute: SPAM_MAX_GLOBAL,
            address_ban_duration: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoryConfig {
    /// Mempool memory budget in MiB. The authoritative cap.
    pub max_memory_usage: u64,
    /// Per-transaction size ceiling in KiB.
    pub max_transaction_size: u64,
    /// Maximum pooled transaction count.
    pub max_pool_size: usize,
    /// Fraction of the memory budget that triggers a cleanup pass.
    pub memory_threshold: f64,
    pub cpu_protection: CpuProtectionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_memory_usage: 100,
            max_transaction_size: 100,
            max_pool_size: 10_000,
            memory_threshold: 0.8,
            cpu_protection: CpuProtectionConfig::default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CpuProtectionConfig {
    pub enabled: bool,
    /// Validation calls allowed per rolling second.
    pub max_cpu_usage: u32,
    /// Memory monitor period in seconds.
    pub monitoring_interval: u64,
    /// Rate-window reset period in seconds.
    pub cleanup_interval: u64,
}

impl Default for CpuProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_cpu_usage: 100,
            monitoring_interval: 10,
            cleanup_interval: 1,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatchProcessingConfig {
    /// Blocks accepted per bulk-import batch.
    pub max_batch_size: usize,
    /// Transactions accepted per submission batch and per validated block.
    pub max_transactions_per_batch: usize,
    /// Mempool cleanup period in seconds.
    pub cleanup_interval: u64,
}

impl Default for BatchProcessingConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            max_transactions_per_batch: 100,
            cleanup_interval: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WalletConfig {
    /// Minimum accepted fee in motes.
    pub min_fee: u64,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self { min_fee: MIN_TX_FEE }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub blockchain_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            blockchain_file: "blockchain.json".into(),
        }
    }
}

impl ChainConfig {
    /// Mempool limits derived from the memory and wallet sections.
    pub fn mempool_limits(&self) -> MempoolLimits {
        MempoolLimits {
            max_pool_size: self.memory.max_pool_size,
            max_memory_bytes: (self.memory.max_memory_usage as usize) * 1024 * 1024,
            min_fee: self.wallet.min_fee,
            max_tx_bytes: (self.memory.max_transaction_size as usize) * 1024,
        }
    }

    /// Spam policy derived from the spamProtection section.
    pub fn spam_policy(&self) -> SpamPolicy {
        SpamPolicy {
            max_per_sender: self.spam_protection.max_transactions_per_address,
            max_global: self.spam_protection.max_transactions_per_minute,
            window_ms: 60_000,
            ban_ms: self.spam_protection.address_ban_duration * 1000,
        }
    }

    /// Target block spacing in milliseconds.
    pub fn block_time_ms(&self) -> u64 {
        self.blockchain.block_time * 1000
    }

    /// Full path of the snapshot file.
    pub fn blockchain_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.blockchain_file)
    }
}
