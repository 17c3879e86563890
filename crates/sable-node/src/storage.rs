//! JSON snapshot persistence.
//!
//! The snapshot is a single JSON object:
//! `{chain, difficulty, miningReward, blockTime, pendingTransactions,
//!   historicalTransactions, historicalTransactionIds}`: the chain, the
//! engine's difficulty state, the mempool contents, and the replay index
//! (nonce map as `[key, record]` pairs plus the committed ID list).
//!
//! Saves are atomic: the snapshot is written to `<file>.tmp` and renamed
//! over the target, so concurrent readers observe whole snapshots only.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sable_core::block::Block;
use sable_core::replay::ReplayRecord;
use sable_core::transaction::Transaction;
use sable_core::types::Hash256;

use crate::error::ChainError;

/// Full engine state in external snapshot form.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub chain: Vec<Block>,
    pub difficulty: u64,
    pub mining_reward: u64,
    /// Target block spacing in seconds.
    pub block_time: u64,
    #[serde(default)]
    pub pending_transactions: Vec<Transaction>,
    /// Replay nonce map as `[key, record]` pairs.
    #[serde(default)]
    pub historical_transactions: Vec<(String, ReplayRecord)>,
    /// Committed transaction IDs.
    #[serde(default)]
    pub historical_transaction_ids: Vec<Hash256>,
}

/// Atomically write a snapshot to `path`.
pub fn save(path: &Path, snapshot: &Snapshot) -> Result<(), ChainError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ChainError::Io(e.to_string()))?;
    }
    let json = serde_json::to_string(snapshot).map_err(|e| ChainError::Io(e.to_string()))?;
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json).map_err(|e| ChainError::Io(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| ChainError::Io(e.to_string()))?;
    debug!(path = %path.display(), "snapshot written");
    Ok(())
}

/// Read a snapshot from `path`.
pub fn load(path: &Path) -> Result<Snapshot, ChainError> {
    let raw = fs::read_to_string(path).map_err(|e| ChainError::Io(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| ChainError::Io(e.to_string()))
}
