//! Contract surface consumed by the RPC collaborator.
//!
//! The HTTP server, its authentication middleware, and its rate limiter
//! live outside this repository; they program against [`ChainApi`] and the
//! DTO shapes here. [`ChainEngine`](crate::engine::ChainEngine) is the one
//! production implementation.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sable_consensus::checkpoint::Checkpoint;
use sable_core::address::Address;
use sable_core::block::Block;
use sable_core::replay::ReplayStats;
use sable_core::transaction::Transaction;
use sable_core::types::{Hash256, TxTag};
use sable_core::utxo::Utxo;

use crate::engine::ChainEngine;
use crate::error::ChainError;

/// Aggregate node status.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub height: u64,
    pub latest_hash: Hash256,
    pub difficulty: u64,
    pub pending_transactions: usize,
    pub total_supply: u64,
    pub replay_protection: ReplayStats,
}

/// Engine operations exposed to the RPC collaborator.
pub trait ChainApi {
    fn status(&self) -> NodeStatus;
    fn get_height(&self) -> u64;
    fn get_latest_block(&self) -> Block;
    fn get_block(&self, index: u64) -> Option<Block>;
    /// Trailing `limit` blocks, oldest first.
    fn get_blocks(&self, limit: usize) -> Vec<Block>;
    fn get_total_supply(&self) -> u64;
    fn get_balance(&self, address: &Address) -> u64;
    fn get_utxos(&self, address: &Address) -> Vec<Utxo>;
    fn get_pending_transactions(&self) -> Vec<Transaction>;
    fn get_replay_stats(&self) -> ReplayStats;

    fn add_pending_transaction(&mut self, tx: Transaction) -> Result<Hash256, ChainError>;
    fn add_transaction_batch(
        &mut self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Result<Hash256, ChainError>>, ChainError>;
    fn add_block(&mut self, block: Block, skip_validation: bool) -> Result<(), ChainError>;
    fn create_transaction(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, ChainError>;

    fn is_valid_chain(&mut self) -> bool;
    fn is_valid_chain_fast(&mut self) -> bool;
    fn is_valid_chain_ultra_fast(&mut self) -> bool;

    fn clear_chain(&mut self) -> Result<(), ChainError>;
    fn save_to_file(&self, path: &Path) -> Result<(), ChainError>;
    fn load_from_file(&mut self, path: &Path) -> Result<(), ChainError>;

    fn get_checkpoints(&self) -> Vec<Checkpoint>;
    fn add_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), ChainError>;
    fn remove_checkpoint(&mut self, height: u64) -> Result<Checkpoint, ChainError>;
}

impl ChainApi for ChainEngine {
    fn status(&self) -> NodeStatus {
        NodeStatus {
            height: self.height(),
            latest_hash: self.latest_block().hash,
            difficulty: self.difficulty(),
            pending_transactions: self.pending_count(),
            total_supply: self.total_supply(),
            replay_protection: self.replay_stats(),
        }
    }

    fn get_height(&self) -> u64 {
        self.height()
    }

    fn get_latest_block(&self) -> Block {
        self.latest_block().clone()
    }

    fn get_block(&self, index: u64) -> Option<Block> {
        self.block(index).cloned()
    }

    fn get_blocks(&self, limit: usize) -> Vec<Block> {
        self.blocks(limit).to_vec()
    }

    fn get_total_supply(&self) -> u64 {
        self.total_supply()
    }

    fn get_balance(&self, address: &Address) -> u64 {
        self.balance(address)
    }

    fn get_utxos(&self, address: &Address) -> Vec<Utxo> {
        self.utxos_of(address)
    }

    fn get_pending_transactions(&self) -> Vec<Transaction> {
        self.pending_transactions()
    }

    fn get_replay_stats(&self) -> ReplayStats {
        self.replay_stats()
    }

    fn add_pending_transaction(&mut self, tx: Transaction) -> Result<Hash256, ChainError> {
        ChainEngine::add_pending_transaction(self, tx)
    }

    fn add_transaction_batch(
        &mut self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Result<Hash256, ChainError>>, ChainError> {
        ChainEngine::add_transaction_batch(self, txs)
    }

    fn add_block(&mut self, block: Block, skip_validation: bool) -> Result<(), ChainError> {
        ChainEngine::add_block(self, block, skip_validation)
    }

    fn create_transaction(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        fee: u64,
    ) -> Result<Transaction, ChainError> {
        ChainEngine::create_transaction(self, from, to, amount, fee, TxTag::Transaction)
    }

    fn is_valid_chain(&mut self) -> bool {
        ChainEngine::is_valid_chain(self)
    }

    fn is_valid_chain_fast(&mut self) -> bool {
        ChainEngine::is_valid_chain_fast(self)
    }

    fn is_valid_chain_ultra_fast(&mut self) -> bool {
        ChainEngine::is_valid_chain_ultra_fast(self)
    }

    fn clear_chain(&mut self) -> Result<(), ChainError> {
        ChainEngine::clear_chain(self)
    }

    fn save_to_file(&self, path: &Path) -> Result<(), ChainError> {
        ChainEngine::save_to_file(self, path)
    }

    fn load_from_file(&mut self, path: &Path) -> Result<(), ChainError> {
        ChainEngine::load_from_file(self, path)
    }

    fn get_checkpoints(&self) -> Vec<Checkpoint> {
        self.checkpoints().checkpoints()
    }

    fn add_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<(), ChainError> {
        self.checkpoints_mut().add(checkpoint)?;
        Ok(())
    }

    fn remove_checkpoint(&mut self, height: u64) -> Result<Checkpoint, ChainError> {
        Ok(self.checkpoints_mut().remove(height)?)
    }
}
