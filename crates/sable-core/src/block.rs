//! Block records: header fields, merkle commitment, and the proof-of-work
//! target check.
//!
//! The header hash is the double-SHA-256 of the canonical JSON header form
//! (index, timestamp, previousHash, merkleRoot, nonce, difficulty,
//! algorithm). KawPow blocks are re-verified through the [`PowHasher`]
//! collaborator; the genesis block's hash is trusted configuration and only
//! checked for well-formedness.

use serde::{Deserialize, Serialize};

use crate::canonical;
use crate::constants::{
    GENESIS_MINING_DIFFICULTY_CAP, MAX_FUTURE_DRIFT_MS, MAX_PAST_DRIFT_MS,
};
use crate::crypto::double_hash;
use crate::error::BlockError;
use crate::merkle;
use crate::transaction::Transaction;
use crate::types::{Algorithm, Hash256, PrevHash};

/// Black-box proof-of-work hashing collaborator.
///
/// Given the header's mining inputs, produces the hash the miner should have
/// stored. The concrete KawPow implementation lives outside this crate; the
/// protocol only needs determinism and the target comparison below.
pub trait PowHasher: Send + Sync {
    /// Expected header hash for `(index, previous_hash, nonce)`.
    ///
    /// The per-epoch seed is derived from `index` by the implementation.
    fn expected_hash(&self, index: u64, previous_hash: &PrevHash, nonce: u64) -> Hash256;
}

/// Canonical header form hashed into [`Block::hash`].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HeaderPayload<'a> {
    index: u64,
    timestamp: u64,
    previous_hash: &'a PrevHash,
    merkle_root: &'a Hash256,
    nonce: u64,
    difficulty: u64,
    algorithm: Algorithm,
}

/// A block: header fields plus the ordered transaction list.
///
/// The first transaction must be a coinbase (premine for genesis); all
/// others must be regular transactions.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    /// Unix milliseconds.
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
    pub previous_hash: PrevHash,
    pub nonce: u64,
    pub difficulty: u64,
    pub hash: Hash256,
    pub merkle_root: Hash256,
    pub algorithm: Algorithm,
}

impl Block {
    /// Assemble a block, computing its merkle root and header hash.
    ///
    /// Every transaction must already carry its ID. The timestamp must be
    /// within wall-clock drift bounds (≤ 2 min future, ≤ 24 h past); the
    /// parent-relative timing rules are checked at admission where the
    /// parent is known.
    pub fn new(
        index: u64,
        timestamp: u64,
        transactions: Vec<Transaction>,
        previous_hash: PrevHash,
        nonce: u64,
        difficulty: u64,
        algorithm: Algorithm,
        now: u64,
    ) -> Result<Self, BlockError> {
        if difficulty == 0 {
            return Err(BlockError::ZeroDifficulty);
        }
        check_timestamp_drift(timestamp, now)?;

        let mut block = Self {
            index,
            timestamp,
            transactions,
            previous_hash,
            nonce,
            difficulty,
            hash: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            algorithm,
        };
        block.merkle_root = block.compute_merkle_root()?;
        block.hash = block.compute_hash();
        Ok(block)
    }

    /// IDs of all transactions, in block order.
    pub fn tx_ids(&self) -> Result<Vec<Hash256>, BlockError> {
        self.transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| tx.id().ok_or(BlockError::MissingTxId(i)))
            .collect()
    }

    /// Recompute the merkle root over the transaction IDs.
    pub fn compute_merkle_root(&self) -> Result<Hash256, BlockError> {
        Ok(merkle::merkle_root(&self.tx_ids()?))
    }

    /// The double-SHA-256 of the canonical header form.
    pub fn compute_hash(&self) -> Hash256 {
        let payload = HeaderPayload {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            merkle_root: &self.merkle_root,
            nonce: self.nonce,
            difficulty: self.difficulty,
            algorithm: self.algorithm,
        };
        // The header payload contains only plain integers and hex strings;
        // canonical serialization cannot fail on it.
        let bytes = canonical::to_canonical_bytes(&payload)
            .expect("header payload is always JSON-representable");
        double_hash(&bytes)
    }

    /// The difficulty used when mining this block. Genesis is capped so the
    /// configured chain can be bootstrapped on commodity hardware.
    pub fn mining_difficulty(&self) -> u64 {
        if self.index == 0 {
            self.difficulty.min(GENESIS_MINING_DIFFICULTY_CAP)
        } else {
            self.difficulty
        }
    }

    /// The PoW target this block must meet when mining.
    pub fn mining_target(&self) -> Hash256 {
        target_for(self.mining_difficulty())
    }

    /// Check proof of work.
    ///
    /// Genesis (index 0) has trusted provenance: any well-formed hash is
    /// accepted. KawPow blocks are recomputed through `hasher` and must match
    /// the stored hash before the target comparison; SHA-256 blocks are
    /// checked against the target only.
    pub fn has_valid_pow(&self, hasher: &dyn PowHasher) -> Result<(), BlockError> {
        if self.index == 0 {
            return Ok(());
        }
        if self.algorithm == Algorithm::Kawpow {
            let expected = hasher.expected_hash(self.index, &self.previous_hash, self.nonce);
            if expected != self.hash {
                return Err(BlockError::HashMismatch);
            }
        }
        if !hash_meets_target(&self.hash, &target_for(self.difficulty)) {
            return Err(BlockError::PoWInsufficient);
        }
        Ok(())
    }

    /// Check transaction placement and per-transaction validity.
    ///
    /// The first transaction must be a coinbase (or premine), no later one
    /// may be, and every transaction must pass its standalone validation.
    pub fn has_valid_transactions(&self, min_fee: u64, now: u64) -> Result<(), BlockError> {
        let Some(first) = self.transactions.first() else {
            return Err(BlockError::NoCoinbase);
        };
        if !first.is_coinbase() {
            return Err(BlockError::FirstTxNotCoinbase);
        }
        for (i, tx) in self.transactions.iter().enumerate().skip(1) {
            if tx.is_coinbase() {
                return Err(BlockError::MisplacedCoinbase(i));
            }
        }
        for (i, tx) in self.transactions.iter().enumerate() {
            tx.validate(min_fee, now)
                .map_err(|source| BlockError::TransactionError { index: i, source })?;
        }
        Ok(())
    }

    /// Full standalone validity: timestamp drift, transactions, merkle
    /// commitment, and proof of work.
    pub fn validate(
        &self,
        hasher: &dyn PowHasher,
        min_fee: u64,
        now: u64,
    ) -> Result<(), BlockError> {
        if self.difficulty == 0 {
            return Err(BlockError::ZeroDifficulty);
        }
        if self.index > 0 {
            check_timestamp_drift(self.timestamp, now)?;
        }
        self.has_valid_transactions(min_fee, now)?;
        if self.compute_merkle_root()? != self.merkle_root {
            return Err(BlockError::InvalidMerkleRoot);
        }
        self.has_valid_pow(hasher)
    }

    /// Total declared fees of all non-coinbase transactions.
    pub fn total_fees(&self) -> u64 {
        self.transactions
            .iter()
            .filter(|tx| !tx.is_coinbase())
            .map(Transaction::fee)
            .sum()
    }

    /// Total output value of the coinbase transaction, or 0 if absent.
    pub fn coinbase_value(&self) -> u64 {
        self.transactions
            .first()
            .filter(|tx| tx.is_coinbase())
            .and_then(|tx| tx.total_output().ok())
            .unwrap_or(0)
    }
}

/// The PoW target for a difficulty: ⌊(2²⁵⁶ − 1) / max(1, difficulty)⌋.
///
/// Computed by big-endian long division over 64-bit limbs.
pub fn target_for(difficulty: u64) -> Hash256 {
    let divisor = difficulty.max(1) as u128;
    let mut out = [0u8; 32];
    let mut rem: u128 = 0;
    for limb in 0..4 {
        let cur = (rem << 64) | u64::MAX as u128;
        let q = (cur / divisor) as u64;
        rem = cur % divisor;
        out[limb * 8..limb * 8 + 8].copy_from_slice(&q.to_be_bytes());
    }
    Hash256(out)
}

/// Big-endian comparison: the hash is valid when `hash ≤ target`.
pub fn hash_meets_target(hash: &Hash256, target: &Hash256) -> bool {
    hash.0 <= target.0
}

/// Wall-clock drift bounds: at most 2 minutes ahead of `now`, at most
/// 24 hours behind.
fn check_timestamp_drift(timestamp: u64, now: u64) -> Result<(), BlockError> {
    if timestamp > now + MAX_FUTURE_DRIFT_MS {
        return Err(BlockError::TimestampOutOfBounds {
            drift_ms: timestamp as i64 - now as i64,
        });
    }
    if timestamp + MAX_PAST_DRIFT_MS < now {
        return Err(BlockError::TimestampOutOfBounds {
            drift_ms: timestamp as i64 - now as i64,
        });
    }
    Ok(())
}
