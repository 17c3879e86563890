//! The chain engine: single writer over all consensus state.
//!
//! The engine exclusively owns the chain, the UTXO ledger, the mempool, the
//! spam guard, the replay index, the checkpoint set, and the current
//! difficulty. Every mutation flows through it; readers take consistent
//! snapshots through the accessor methods (the node wraps the engine in a
//! `parking_lot::RwLock`).
//!
//! Block admission is append-only: the engine admits only the unique
//! successor of the current tip, never a reorg:
//!
//! ```text
//! Ready → Validating → LinkCheck → Apply → Index → Difficulty → Ready
//!            │failure      │fail     │fail   (Apply is all-or-nothing;
//!            └─────────────┴─────────┴────→  Rejected, no side effects)
//! ```

use tracing::{debug, info, warn};

use sable_consensus::checkpoint::CheckpointManager;
use sable_consensus::difficulty::{retarget, RetargetPolicy};
use sable_consensus::pow::SeededKawpow;
use sable_consensus::validator::{BlockContext, BlockValidator, GuardPolicy, ValidationMode};
use sable_core::address::Address;
use sable_core::block::Block;
use sable_core::config::ChainConfig;
use sable_core::constants::{GENESIS_MINING_DIFFICULTY_CAP, MAX_BLOCK_BYTES, TX_LOCK_TIMEOUT_MS};
use sable_core::error::{MempoolError, TransactionError};
use sable_core::mempool::{Mempool, TxLocks};
use sable_core::replay::{ReplayIndex, ReplayStats};
use sable_core::spam::SpamGuard;
use sable_core::transaction::{now_ms, Transaction, TxInput, TxOutput};
use sable_core::types::{Hash256, PrevHash, TxTag};
use sable_core::utxo::{Utxo, UtxoLedger};

use crate::error::ChainError;
use crate::storage::{self, Snapshot};

/// The single-writer core of the node.
#[derive(Debug)]
pub struct ChainEngine {
    config: ChainConfig,
    chain: Vec<Block>,
    utxo: UtxoLedger,
    mempool: Mempool,
    spam: SpamGuard,
    replay: ReplayIndex,
    checkpoints: CheckpointManager,
    validator: BlockValidator,
    locks: TxLocks,
    difficulty: u64,
    miner_address: Address,
}

impl ChainEngine {
    /// Bootstrap an engine: build the genesis block (from configuration or
    /// defaults), apply it, and verify the loaded checkpoints.
    ///
    /// A checkpoint violation here is fatal; the caller must convert it to
    /// process exit code 1.
    pub fn initialize(
        config: ChainConfig,
        miner_address: Address,
        checkpoints: CheckpointManager,
    ) -> Result<Self, ChainError> {
        let guard = GuardPolicy {
            enabled: config.memory.cpu_protection.enabled,
            rate_limit_per_second: config.memory.cpu_protection.max_cpu_usage,
            max_execution_ms: 5_000,
            max_tx_per_batch: config.batch_processing.max_transactions_per_batch,
        };
        let mut engine = Self {
            mempool: Mempool::new(config.mempool_limits()),
            spam: SpamGuard::new(config.spam_policy()),
            replay: ReplayIndex::new(),
            utxo: UtxoLedger::new(),
            chain: Vec::new(),
            checkpoints,
            validator: BlockValidator::new(Box::new(SeededKawpow::new()), guard),
            locks: TxLocks::new(TX_LOCK_TIMEOUT_MS),
            difficulty: 0,
            miner_address,
            config,
        };
        engine.bootstrap_genesis()?;
        engine.checkpoints.validate(&engine.chain)?;
        info!(
            height = engine.height(),
            difficulty = engine.difficulty,
            "chain engine initialized"
        );
        Ok(engine)
    }

    /// Build and apply the genesis block.
    fn bootstrap_genesis(&mut self) -> Result<(), ChainError> {
        let genesis = self.build_genesis()?;
        self.difficulty = genesis.difficulty;
        self.utxo.apply_block(&genesis)?;
        self.replay.record(&genesis);
        self.chain.push(genesis);
        Ok(())
    }

    /// The genesis block from `blockchain.genesis`, or defaults when the
    /// section is absent (premine of one reward to the engine's address).
    fn build_genesis(&self) -> Result<Block, ChainError> {
        let genesis_cfg = self.config.blockchain.genesis.clone();
        let (timestamp, difficulty, amount, address, nonce, algorithm) = match &genesis_cfg {
            Some(g) => (
                g.timestamp,
                g.difficulty,
                g.premine_amount,
                g.premine_address.clone(),
                g.nonce,
                g.algorithm,
            ),
            None => (
                now_ms(),
                GENESIS_MINING_DIFFICULTY_CAP,
                self.config.blockchain.coinbase_reward,
                self.miner_address.clone(),
                0,
                self.config.blockchain.difficulty_algorithm,
            ),
        };

        let mut premine = Transaction::coinbase(
            vec![TxOutput::new(address, amount)],
            TxTag::Premine,
            Some(timestamp),
            genesis_cfg.as_ref().and_then(|g| g.coinbase_nonce.clone()),
            genesis_cfg.as_ref().and_then(|g| g.coinbase_atomic_sequence.clone()),
        )?;
        premine.compute_id()?;

        // Genesis is trusted configuration: assemble against its own
        // timestamp so historic launch instants pass the drift check.
        let mut block = Block::new(
            0,
            timestamp,
            vec![premine],
            PrevHash::Genesis,
            nonce,
            difficulty,
            algorithm,
            timestamp,
        )?;
        if let Some(hash) = genesis_cfg.as_ref().and_then(|g| g.hash) {
            block.hash = hash;
        }
        Ok(block)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn height(&self) -> u64 {
        self.chain.len() as u64
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn latest_block(&self) -> &Block {
        self.chain.last().expect("chain holds at least genesis")
    }

    pub fn block(&self, index: u64) -> Option<&Block> {
        self.chain.get(index as usize)
    }

    /// The trailing `limit` blocks, oldest first.
    pub fn blocks(&self, limit: usize) -> &[Block] {
        let start = self.chain.len().saturating_sub(limit);
        &self.chain[start..]
    }

    pub fn difficulty(&self) -> u64 {
        self.difficulty
    }

    pub fn balance(&self, address: &Address) -> u64 {
        self.utxo.balance(address)
    }

    pub fn utxos_of(&self, address: &Address) -> Vec<Utxo> {
        self.utxo.utxos_of(address)
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.mempool.transactions()
    }

    pub fn pending_count(&self) -> usize {
        self.mempool.len()
    }

    /// Coarse supply estimate: height × reward. Premine and fees are not
    /// separately counted.
    pub fn total_supply(&self) -> u64 {
        self.height() * self.config.blockchain.coinbase_reward
    }

    pub fn replay_stats(&self) -> ReplayStats {
        self.replay.stats()
    }

    pub fn checkpoints(&self) -> &CheckpointManager {
        &self.checkpoints
    }

    pub fn checkpoints_mut(&mut self) -> &mut CheckpointManager {
        &mut self.checkpoints
    }

    // ------------------------------------------------------------------
    // Block admission
    // ------------------------------------------------------------------

    /// Admit the next block of the chain.
    ///
    /// With `skip_validation` the block is checked for linkage only (bulk
    /// import of a trusted chain); otherwise it runs the full validator.
    /// A checkpoint mismatch at this height is fatal. On success the block
    /// is applied to the UTXO ledger, included transactions leave the
    /// mempool, the replay index records the block, and the difficulty is
    /// retargeted.
    pub fn add_block(&mut self, block: Block, skip_validation: bool) -> Result<(), ChainError> {
        if self.chain.iter().any(|b| b.hash == block.hash) {
            return Err(ChainError::DuplicateBlock(block.hash.to_hex()));
        }

        let mode = if skip_validation {
            ValidationMode::UltraFast
        } else {
            ValidationMode::Full
        };
        let ctx = BlockContext {
            prev: self.chain.last(),
            min_fee: self.config.wallet.min_fee,
            now: now_ms(),
            coinbase_reward: self.config.blockchain.coinbase_reward,
        };
        self.validator.validate(&block, &ctx, mode)?;

        self.checkpoints.verify_block(&block)?;

        // Apply is all-or-nothing; the ledger restores itself on failure,
        // so a rejection here leaves no side effects.
        self.utxo.apply_block(&block)?;
        self.mempool.remove_included(&block);
        self.replay.record(&block);
        debug!(index = block.index, hash = %block.hash, txs = block.transactions.len(), "block connected");
        self.chain.push(block);
        self.adjust_difficulty();
        Ok(())
    }

    /// Retarget difficulty from the trailing window.
    pub fn adjust_difficulty(&mut self) {
        let policy = RetargetPolicy {
            target_block_time_ms: self.config.block_time_ms(),
            window: self.config.blockchain.difficulty_blocks,
            minimum: self.config.blockchain.difficulty_minimum,
        };
        let next = retarget(&self.chain, self.difficulty, &policy);
        if next != self.difficulty {
            info!(from = self.difficulty, to = next, "difficulty adjusted");
            self.difficulty = next;
        }
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Build an unsigned transfer from `from`'s confirmed UTXOs.
    ///
    /// Selects UTXOs in deterministic (tx id, output index) order until the
    /// amount plus fee is covered; adds a change output when positive. Only
    /// the `TRANSACTION` tag is accepted; the rest are reserved for
    /// protocol records. The wallet collaborator signs and freezes the
    /// result.
    pub fn create_transaction(
        &self,
        from: &Address,
        to: &Address,
        amount: u64,
        fee: u64,
        tag: TxTag,
    ) -> Result<Transaction, ChainError> {
        if tag != TxTag::Transaction {
            return Err(TransactionError::ReservedTag(tag.to_string()).into());
        }
        let need = amount
            .checked_add(fee)
            .ok_or(TransactionError::ValueOverflow)?;

        let mut selected = Vec::new();
        let mut gathered = 0u64;
        for utxo in self.utxo.utxos_of(from) {
            gathered = gathered
                .checked_add(utxo.amount)
                .ok_or(TransactionError::ValueOverflow)?;
            selected.push(utxo);
            if gathered >= need {
                break;
            }
        }
        if gathered < need {
            return Err(TransactionError::InsufficientBalance {
                have: self.utxo.balance(from),
                need,
            }
            .into());
        }

        let inputs: Vec<TxInput> = selected
            .iter()
            .map(|u| TxInput::unsigned(u.tx_id, u.output_index, Vec::new()))
            .collect();
        let mut outputs = vec![TxOutput::new(to.clone(), amount)];
        let change = gathered - need;
        if change > 0 {
            outputs.push(TxOutput::new(from.clone(), change));
        }

        Ok(Transaction::new(inputs, outputs, fee, tag, None, None, None)?)
    }

    /// Admit a pending transaction through the anti-abuse pipeline:
    /// processing lock, committed-replay check, spam accounting, then the
    /// mempool's own admission rules.
    pub fn add_pending_transaction(&mut self, tx: Transaction) -> Result<Hash256, ChainError> {
        let now = now_ms();
        let id = tx
            .id()
            .ok_or_else(|| MempoolError::Internal("transaction has no id".into()))?;

        if tx.is_coinbase() {
            return Err(
                TransactionError::InvalidFormat("coinbase cannot be submitted".into()).into(),
            );
        }

        if !self.locks.acquire(id, now) {
            return Err(MempoolError::RateLimited(format!(
                "transaction {id} is already being processed"
            ))
            .into());
        }
        let result = self.admit_pending(tx, id, now);
        self.locks.release(&id);
        result
    }

    fn admit_pending(
        &mut self,
        tx: Transaction,
        id: Hash256,
        now: u64,
    ) -> Result<Hash256, ChainError> {
        if self.replay.is_replay(&tx) {
            warn!(%id, "replay rejected against committed history");
            return Err(MempoolError::ReplayDetected(id.to_hex()).into());
        }

        let sender = tx
            .sender_fingerprint()
            .ok_or_else(|| TransactionError::InvalidFormat("input without public key".into()))?;
        self.spam.admit(&sender, now)?;

        let admitted = self.mempool.add(tx, now)?;
        debug!(id = %admitted, pool = self.mempool.len(), "transaction admitted to mempool");
        Ok(admitted)
    }

    /// Admit a batch, bounded by `batchProcessing.maxTransactionsPerBatch`.
    /// Returns one outcome per transaction in input order.
    pub fn add_transaction_batch(
        &mut self,
        txs: Vec<Transaction>,
    ) -> Result<Vec<Result<Hash256, ChainError>>, ChainError> {
        let max = self.config.batch_processing.max_transactions_per_batch;
        if txs.len() > max {
            return Err(sable_core::error::BlockError::BatchTooLarge {
                count: txs.len(),
                max,
            }
            .into());
        }
        Ok(txs
            .into_iter()
            .map(|tx| self.add_pending_transaction(tx))
            .collect())
    }

    /// Select pending transactions for the next block template.
    pub fn select_for_block(&self) -> Vec<Transaction> {
        self.mempool.select_for_block(
            MAX_BLOCK_BYTES,
            self.config.batch_processing.max_transactions_per_batch,
        )
    }

    /// Assemble an unmined successor of the tip: a coinbase paying the
    /// engine's reward address plus the current mempool selection. The
    /// caller (miner) searches the nonce and resubmits via
    /// [`add_block`](Self::add_block).
    pub fn create_block_template(&self, timestamp: u64) -> Result<Block, ChainError> {
        let selected = self.select_for_block();
        let reward = self.config.blockchain.coinbase_reward
            + selected.iter().map(Transaction::fee).sum::<u64>();

        let tip = self.latest_block();
        // Height-tagged nonce keeps coinbase ids distinct across blocks.
        let mut coinbase = Transaction::coinbase(
            vec![TxOutput::new(self.miner_address.clone(), reward)],
            TxTag::Coinbase,
            Some(timestamp),
            Some((tip.index + 1).to_string()),
            None,
        )?;
        coinbase.compute_id()?;

        let mut transactions = vec![coinbase];
        transactions.extend(selected);

        Ok(Block::new(
            tip.index + 1,
            timestamp,
            transactions,
            PrevHash::Block(tip.hash),
            0,
            self.difficulty,
            self.config.blockchain.difficulty_algorithm,
            now_ms(),
        )?)
    }

    // ------------------------------------------------------------------
    // Chain re-validation
    // ------------------------------------------------------------------

    fn revalidate(&mut self, mode: ValidationMode) -> bool {
        for i in 0..self.chain.len() {
            let block = &self.chain[i];
            let prev = if i == 0 { None } else { Some(&self.chain[i - 1]) };
            // Validate history against its own clock: wall-clock drift and
            // expiry rules apply at admission, not retroactively.
            let ctx = BlockContext {
                prev,
                min_fee: self.config.wallet.min_fee,
                now: block.timestamp,
                coinbase_reward: self.config.blockchain.coinbase_reward,
            };
            if let Err(e) = self.validator.validate(block, &ctx, mode) {
                warn!(index = block.index, error = %e, "chain re-validation failed");
                return false;
            }
        }
        true
    }

    pub fn is_valid_chain(&mut self) -> bool {
        self.revalidate(ValidationMode::Full)
    }

    pub fn is_valid_chain_fast(&mut self) -> bool {
        self.revalidate(ValidationMode::Fast)
    }

    pub fn is_valid_chain_ultra_fast(&mut self) -> bool {
        self.revalidate(ValidationMode::UltraFast)
    }

    // ------------------------------------------------------------------
    // Maintenance (periodic task entry points)
    // ------------------------------------------------------------------

    /// Drop expired pool transactions. Returns how many were removed.
    pub fn cleanup_mempool(&mut self) -> usize {
        self.mempool.cleanup_expired(now_ms())
    }

    /// Memory monitor: when pool memory crosses the configured threshold of
    /// the budget, run a cleanup-then-manage pass.
    pub fn monitor_memory(&mut self) {
        let max = self.mempool.limits().max_memory_bytes;
        let threshold = (max as f64 * self.config.memory.memory_threshold) as usize;
        if self.mempool.memory_bytes() > threshold {
            warn!(
                bytes = self.mempool.memory_bytes(),
                threshold, "mempool memory above threshold, cleaning"
            );
            self.mempool.cleanup_expired(now_ms());
            self.mempool.manage();
        }
    }

    /// Drop idle spam-guard entries and expired transaction locks.
    pub fn cleanup_spam_state(&mut self) {
        let now = now_ms();
        self.spam.cleanup(now);
        self.locks.prune(now);
    }

    /// Reset the validator's rolling rate window.
    pub fn reset_validation_window(&mut self) {
        self.validator.reset_rate_window();
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Write the full state snapshot to `path` (atomic rewrite).
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ChainError> {
        let snapshot = Snapshot {
            chain: self.chain.clone(),
            difficulty: self.difficulty,
            mining_reward: self.config.blockchain.coinbase_reward,
            block_time: self.config.blockchain.block_time,
            pending_transactions: self.mempool.transactions(),
            historical_transactions: self.replay.entries(),
            historical_transaction_ids: self.replay.ids(),
        };
        storage::save(path, &snapshot)?;
        info!(path = %path.display(), height = self.height(), "snapshot saved");
        Ok(())
    }

    /// Replace engine state from a snapshot.
    ///
    /// Checkpoints are re-verified first (fatal on mismatch), then the UTXO
    /// ledger is rebuilt by replaying the chain and the replay index is
    /// restored from the snapshot, or rebuilt when the snapshot lacks it.
    pub fn load_from_file(&mut self, path: &std::path::Path) -> Result<(), ChainError> {
        let snapshot = storage::load(path)?;
        self.checkpoints.validate(&snapshot.chain)?;

        let mut utxo = UtxoLedger::new();
        utxo.rebuild(&snapshot.chain)?;

        let mut replay = ReplayIndex::from_parts(
            snapshot.historical_transactions,
            snapshot.historical_transaction_ids,
        );
        if replay.is_empty() {
            replay.rebuild(&snapshot.chain);
        }

        self.chain = snapshot.chain;
        self.difficulty = snapshot.difficulty;
        self.utxo = utxo;
        self.replay = replay;
        self.mempool.clear();
        let now = now_ms();
        for tx in snapshot.pending_transactions {
            if let Err(e) = self.mempool.add(tx, now) {
                debug!(error = %e, "skipping stale pending transaction from snapshot");
            }
        }
        info!(path = %path.display(), height = self.height(), "snapshot loaded");
        Ok(())
    }

    /// Reset all state and re-bootstrap genesis. Testing only.
    pub fn clear_chain(&mut self) -> Result<(), ChainError> {
        self.chain.clear();
        self.utxo = UtxoLedger::new();
        self.mempool.clear();
        self.replay = ReplayIndex::new();
        self.spam = SpamGuard::new(self.config.spam_policy());
        self.locks = TxLocks::new(TX_LOCK_TIMEOUT_MS);
        self.bootstrap_genesis()?;
        Ok(())
    }
}
