//! Trusted (height → hash) checkpoint assertions.
//!
//! Checkpoints pin known-good blocks so that a node syncing a tampered or
//! corrupt chain halts instead of building on it. A mismatch is treated as
//! catastrophic corruption: [`CheckpointError::Violation`] is fatal and the
//! hosting binary converts it to exit code 1; the library itself never
//! terminates the process.
//!
//! The on-disk form is `checkpoints.json`:
//! `{"checkpoints": [{"height": u64, "hash": 64-hex, "description"?: s}], "metadata"?: {}}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use sable_core::block::Block;
use sable_core::types::Hash256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CheckpointError {
    #[error(
        "checkpoint violation at height {height}: expected {expected}, chain has {actual} \
         (block timestamp {block_timestamp}); delete the chain file and resync"
    )]
    Violation {
        height: u64,
        expected: Hash256,
        actual: Hash256,
        block_timestamp: u64,
    },
    #[error("duplicate checkpoint height {0}")] DuplicateHeight(u64),
    #[error("no checkpoint at height {0}")] UnknownHeight(u64),
    #[error("parse: {0}")] Parse(String),
    #[error("io: {0}")] Io(String),
}

impl CheckpointError {
    /// Whether this error must terminate the process (exit code 1).
    pub fn is_fatal(&self) -> bool {
        matches!(self, CheckpointError::Violation { .. })
    }
}

/// One trusted assertion: the block at `height` must have `hash`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub height: u64,
    pub hash: Hash256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// On-disk file shape.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
struct CheckpointFile {
    #[serde(default)]
    checkpoints: Vec<Checkpoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

/// Parsed checkpoint set with unique heights.
#[derive(Default, Debug)]
pub struct CheckpointManager {
    by_height: BTreeMap<u64, Checkpoint>,
    metadata: Option<serde_json::Value>,
}

impl CheckpointManager {
    /// An empty manager (no assertions, so every chain passes).
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, rejecting duplicate heights. Malformed hashes are
    /// rejected earlier, during deserialization of [`Hash256`].
    pub fn from_checkpoints(list: Vec<Checkpoint>) -> Result<Self, CheckpointError> {
        let mut by_height = BTreeMap::new();
        for cp in list {
            if by_height.insert(cp.height, cp.clone()).is_some() {
                return Err(CheckpointError::DuplicateHeight(cp.height));
            }
        }
        Ok(Self { by_height, metadata: None })
    }

    /// Load and structurally validate `checkpoints.json`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| CheckpointError::Io(e.to_string()))?;
        let file: CheckpointFile =
            serde_json::from_str(&raw).map_err(|e| CheckpointError::Parse(e.to_string()))?;
        let mut manager = Self::from_checkpoints(file.checkpoints)?;
        manager.metadata = file.metadata;
        info!(count = manager.len(), "checkpoints loaded");
        Ok(manager)
    }

    /// Write the current set back to `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CheckpointError> {
        let file = CheckpointFile {
            checkpoints: self.by_height.values().cloned().collect(),
            metadata: self.metadata.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| CheckpointError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), json).map_err(|e| CheckpointError::Io(e.to_string()))
    }

    /// Add a new assertion. Fails on an already-pinned height.
    pub fn add(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if self.by_height.contains_key(&checkpoint.height) {
            return Err(CheckpointError::DuplicateHeight(checkpoint.height));
        }
        self.by_height.insert(checkpoint.height, checkpoint);
        Ok(())
    }

    /// Replace the assertion at an existing height.
    pub fn update(&mut self, checkpoint: Checkpoint) -> Result<(), CheckpointError> {
        if !self.by_height.contains_key(&checkpoint.height) {
            return Err(CheckpointError::UnknownHeight(checkpoint.height));
        }
        self.by_height.insert(checkpoint.height, checkpoint);
        Ok(())
    }

    /// Remove and return the assertion at `height`.
    pub fn remove(&mut self, height: u64) -> Result<Checkpoint, CheckpointError> {
        self.by_height
            .remove(&height)
            .ok_or(CheckpointError::UnknownHeight(height))
    }

    pub fn clear(&mut self) {
        self.by_height.clear();
    }

    pub fn get(&self, height: u64) -> Option<&Checkpoint> {
        self.by_height.get(&height)
    }

    pub fn len(&self) -> usize {
        self.by_height.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_height.is_empty()
    }

    /// All assertions in height order.
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.by_height.values().cloned().collect()
    }

    /// Verify one block against the assertion at its height, if any.
    pub fn verify_block(&self, block: &Block) -> Result<(), CheckpointError> {
        let Some(cp) = self.by_height.get(&block.index) else {
            return Ok(());
        };
        if cp.hash != block.hash {
            let violation = CheckpointError::Violation {
                height: block.index,
                expected: cp.hash,
                actual: block.hash,
                block_timestamp: block.timestamp,
            };
            error!(
                height = block.index,
                expected = %cp.hash,
                actual = %block.hash,
                block_timestamp = block.timestamp,
                "checkpoint violation: chain history does not match trusted assertion; \
                 operators must delete the corrupt chain file and resync"
            );
            return Err(violation);
        }
        Ok(())
    }

    /// Verify every assertion whose height lies inside `chain`.
    ///
    /// A mismatch is fatal; the caller must propagate it to process exit.
    pub fn validate(&self, chain: &[Block]) -> Result<(), CheckpointError> {
        for cp in self.by_height.values() {
            let Some(block) = chain.get(cp.height as usize) else {
                continue;
            };
            self.verify_block(block)?;
        }
        Ok(())
    }
}
