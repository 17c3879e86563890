//! Tiered block validation with a CPU guard.
//!
//! Three modes:
//! - **Full**: structure, merkle commitment, proof of work, every
//!   transaction, parent linkage, and the coinbase value equation.
//! - **Fast**: structure, merkle, and linkage; skips PoW and signatures.
//!   Used for bulk import of already-trusted chains.
//! - **UltraFast**: parent linkage only. Used for catastrophic-speed
//!   rechecks over long chains.
//!
//! The CPU guard bounds validation work: a rolling one-second call budget
//! (excess calls fail with `RateLimited`), a per-block transaction-count cap
//! (`BatchTooLarge`), and a soft execution-time ceiling that logs a warning
//! but lets the call complete.

use std::time::Instant;

use tracing::warn;

use sable_core::block::{Block, PowHasher};
use sable_core::constants::{MAX_BLOCK_INTERVAL_MS, MIN_BLOCK_INTERVAL_MS};
use sable_core::error::BlockError;

/// Validation depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    Full,
    Fast,
    UltraFast,
}

/// Chain-state context for validating one block.
#[derive(Clone, Copy, Debug)]
pub struct BlockContext<'a> {
    /// The current tip; `None` only for genesis.
    pub prev: Option<&'a Block>,
    /// Minimum fee for transaction validity (Full mode).
    pub min_fee: u64,
    /// Wall clock in Unix milliseconds.
    pub now: u64,
    /// Base coinbase reward for the coinbase value equation (Full mode).
    pub coinbase_reward: u64,
}

/// CPU-guard tunables.
#[derive(Clone, Copy, Debug)]
pub struct GuardPolicy {
    pub enabled: bool,
    /// Validation calls allowed per rolling second.
    pub rate_limit_per_second: u32,
    /// Soft ceiling on one validation call, in milliseconds.
    pub max_execution_ms: u64,
    /// Maximum transactions per validated block.
    pub max_tx_per_batch: usize,
}

impl Default for GuardPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            rate_limit_per_second: 100,
            max_execution_ms: 5_000,
            max_tx_per_batch: 100,
        }
    }
}

/// Block validator owning the PoW collaborator and the CPU-guard state.
pub struct BlockValidator {
    hasher: Box<dyn PowHasher>,
    policy: GuardPolicy,
    window_start: Instant,
    calls_in_window: u32,
}

impl std::fmt::Debug for BlockValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockValidator")
            .field("policy", &self.policy)
            .field("window_start", &self.window_start)
            .field("calls_in_window", &self.calls_in_window)
            .finish()
    }
}

impl BlockValidator {
    pub fn new(hasher: Box<dyn PowHasher>, policy: GuardPolicy) -> Self {
        Self {
            hasher,
            policy,
            window_start: Instant::now(),
            calls_in_window: 0,
        }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Reset the rolling rate window (periodic task entry point).
    pub fn reset_rate_window(&mut self) {
        self.window_start = Instant::now();
        self.calls_in_window = 0;
    }

    fn guard_admit(&mut self, block: &Block) -> Result<(), BlockError> {
        if !self.policy.enabled {
            return Ok(());
        }
        if block.transactions.len() > self.policy.max_tx_per_batch {
            return Err(BlockError::BatchTooLarge {
                count: block.transactions.len(),
                max: self.policy.max_tx_per_batch,
            });
        }
        if self.window_start.elapsed().as_secs() >= 1 {
            self.reset_rate_window();
        }
        if self.calls_in_window >= self.policy.rate_limit_per_second {
            return Err(BlockError::RateLimited);
        }
        self.calls_in_window += 1;
        Ok(())
    }

    fn guard_finish(&self, block: &Block, started: Instant) {
        if !self.policy.enabled {
            return;
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > self.policy.max_execution_ms {
            warn!(
                index = block.index,
                elapsed_ms,
                complexity = block.transactions.len(),
                limit_ms = self.policy.max_execution_ms,
                "validation exceeded execution ceiling"
            );
        }
    }

    /// Validate `block` at the requested depth.
    pub fn validate(
        &mut self,
        block: &Block,
        ctx: &BlockContext<'_>,
        mode: ValidationMode,
    ) -> Result<(), BlockError> {
        self.guard_admit(block)?;
        let started = Instant::now();
        let result = self.validate_inner(block, ctx, mode);
        self.guard_finish(block, started);
        result
    }

    fn validate_inner(
        &self,
        block: &Block,
        ctx: &BlockContext<'_>,
        mode: ValidationMode,
    ) -> Result<(), BlockError> {
        check_linkage(block, ctx.prev)?;
        if mode == ValidationMode::UltraFast {
            return Ok(());
        }

        check_parent_timing(block, ctx.prev)?;

        match mode {
            ValidationMode::Fast => {
                // Structure and commitment only; no PoW, no signatures.
                let Some(first) = block.transactions.first() else {
                    return Err(BlockError::NoCoinbase);
                };
                if !first.is_coinbase() {
                    return Err(BlockError::FirstTxNotCoinbase);
                }
                for (i, tx) in block.transactions.iter().enumerate().skip(1) {
                    if tx.is_coinbase() {
                        return Err(BlockError::MisplacedCoinbase(i));
                    }
                }
                if block.compute_merkle_root()? != block.merkle_root {
                    return Err(BlockError::InvalidMerkleRoot);
                }
                Ok(())
            }
            ValidationMode::Full => {
                block.validate(self.hasher.as_ref(), ctx.min_fee, ctx.now)?;
                if block.index > 0 {
                    self.check_coinbase_value(block, ctx.coinbase_reward)?;
                }
                Ok(())
            }
            ValidationMode::UltraFast => unreachable!("handled above"),
        }
    }

    /// Coinbase value equation: minted must equal reward plus the block's
    /// declared fees, exactly.
    pub fn check_coinbase_value(
        &self,
        block: &Block,
        coinbase_reward: u64,
    ) -> Result<(), BlockError> {
        let expected = coinbase_reward + block.total_fees();
        let got = block.coinbase_value();
        if got != expected {
            return Err(BlockError::CoinbaseAmountMismatch { got, expected });
        }
        Ok(())
    }
}

/// Index and parent-hash linkage.
fn check_linkage(block: &Block, prev: Option<&Block>) -> Result<(), BlockError> {
    match prev {
        None => {
            if block.index != 0 {
                return Err(BlockError::LinkageMismatch(format!(
                    "block index {} without a parent",
                    block.index
                )));
            }
            if !block.previous_hash.is_genesis() {
                return Err(BlockError::LinkageMismatch(
                    "genesis parent must be the sentinel".into(),
                ));
            }
            Ok(())
        }
        Some(prev) => {
            if block.index != prev.index + 1 {
                return Err(BlockError::LinkageMismatch(format!(
                    "index {} does not follow tip {}",
                    block.index, prev.index
                )));
            }
            if block.previous_hash.hash() != Some(prev.hash) {
                return Err(BlockError::LinkageMismatch(format!(
                    "previous hash {} does not match tip {}",
                    block.previous_hash, prev.hash
                )));
            }
            Ok(())
        }
    }
}

/// Parent-relative timing: strictly increasing, interval within [1 s, 1 h].
fn check_parent_timing(block: &Block, prev: Option<&Block>) -> Result<(), BlockError> {
    let Some(prev) = prev else {
        return Ok(());
    };
    let interval = block.timestamp as i64 - prev.timestamp as i64;
    if interval < MIN_BLOCK_INTERVAL_MS as i64 {
        return Err(BlockError::TimestampTooCloseToPrev { interval_ms: interval });
    }
    if interval > MAX_BLOCK_INTERVAL_MS as i64 {
        return Err(BlockError::TimestampOutOfBounds { drift_ms: interval });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pow::SeededKawpow;
    use sable_core::address::Address;
    use sable_core::constants::COIN;
    use sable_core::crypto::KeyPair;
    use sable_core::transaction::{Transaction, TxInput, TxOutput};
    use sable_core::types::{Algorithm, Hash256, PrevHash, TxTag};

    const NOW: u64 = 1_700_000_000_000;

    fn validator() -> BlockValidator {
        BlockValidator::new(Box::new(SeededKawpow::new()), GuardPolicy::default())
    }

    fn ctx<'a>(prev: Option<&'a Block>, now: u64) -> BlockContext<'a> {
        BlockContext { prev, min_fee: 1, now, coinbase_reward: 50 * COIN }
    }

    fn coinbase(amount: u64, nonce: &str, ts: u64) -> Transaction {
        let mut tx = Transaction::coinbase(
            vec![TxOutput::new(Address::new("addr_M").unwrap(), amount)],
            TxTag::Coinbase,
            Some(ts),
            Some(nonce.into()),
            None,
        )
        .unwrap();
        tx.compute_id().unwrap();
        tx
    }

    fn genesis() -> Block {
        Block::new(
            0,
            NOW,
            vec![coinbase(50 * COIN, "g0", NOW)],
            PrevHash::Genesis,
            0,
            1000,
            Algorithm::Sha256,
            NOW,
        )
        .unwrap()
    }

    /// A sha256 child mined to difficulty 1 (any hash passes).
    fn child_of(prev: &Block, txs: Vec<Transaction>, ts: u64) -> Block {
        let mut all = vec![coinbase(
            50 * COIN + txs.iter().map(|t| t.fee()).sum::<u64>(),
            &format!("cb{}", prev.index + 1),
            ts,
        )];
        all.extend(txs);
        Block::new(
            prev.index + 1,
            ts,
            all,
            PrevHash::Block(prev.hash),
            0,
            1,
            Algorithm::Sha256,
            ts,
        )
        .unwrap()
    }

    // ------------------------------------------------------------------
    // Linkage
    // ------------------------------------------------------------------

    #[test]
    fn genesis_linkage_ok() {
        let mut v = validator();
        let g = genesis();
        assert!(v.validate(&g, &ctx(None, NOW), ValidationMode::Full).is_ok());
    }

    #[test]
    fn genesis_with_parent_hash_rejected() {
        let mut v = validator();
        let mut g = genesis();
        g.previous_hash = PrevHash::Block(Hash256([1; 32]));
        assert!(matches!(
            v.validate(&g, &ctx(None, NOW), ValidationMode::UltraFast).unwrap_err(),
            BlockError::LinkageMismatch(_)
        ));
    }

    #[test]
    fn index_gap_rejected() {
        let mut v = validator();
        let g = genesis();
        let mut b1 = child_of(&g, vec![], NOW + 60_000);
        b1.index = 5;
        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), NOW), ValidationMode::UltraFast).unwrap_err(),
            BlockError::LinkageMismatch(_)
        ));
    }

    #[test]
    fn wrong_parent_hash_rejected() {
        let mut v = validator();
        let g = genesis();
        let mut b1 = child_of(&g, vec![], NOW + 60_000);
        b1.previous_hash = PrevHash::Block(Hash256([0xEE; 32]));
        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), NOW), ValidationMode::UltraFast).unwrap_err(),
            BlockError::LinkageMismatch(_)
        ));
    }

    #[test]
    fn ultra_fast_checks_linkage_only() {
        let mut v = validator();
        let g = genesis();
        let mut b1 = child_of(&g, vec![], NOW + 60_000);
        // Corrupt the merkle root; UltraFast must not notice.
        b1.merkle_root = Hash256([0xEE; 32]);
        assert!(v.validate(&b1, &ctx(Some(&g), NOW), ValidationMode::UltraFast).is_ok());
    }

    // ------------------------------------------------------------------
    // Parent timing
    // ------------------------------------------------------------------

    #[test]
    fn interval_below_one_second_rejected() {
        let mut v = validator();
        let g = genesis();
        let b1 = child_of(&g, vec![], NOW + 999);
        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), NOW), ValidationMode::Fast).unwrap_err(),
            BlockError::TimestampTooCloseToPrev { .. }
        ));
    }

    #[test]
    fn non_increasing_timestamp_rejected() {
        let mut v = validator();
        let g = genesis();
        let mut b1 = child_of(&g, vec![], NOW + 60_000);
        b1.timestamp = NOW;
        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), NOW), ValidationMode::Fast).unwrap_err(),
            BlockError::TimestampTooCloseToPrev { .. }
        ));
    }

    #[test]
    fn interval_over_one_hour_rejected() {
        let mut v = validator();
        let g = genesis();
        let late = NOW + MAX_BLOCK_INTERVAL_MS + 1;
        let b1 = child_of(&g, vec![], late);
        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), late), ValidationMode::Fast).unwrap_err(),
            BlockError::TimestampOutOfBounds { .. }
        ));
    }

    #[test]
    fn interval_boundaries_accepted() {
        let mut v = validator();
        let g = genesis();
        for ts in [NOW + MIN_BLOCK_INTERVAL_MS, NOW + MAX_BLOCK_INTERVAL_MS] {
            let b1 = child_of(&g, vec![], ts);
            assert!(v.validate(&b1, &ctx(Some(&g), ts), ValidationMode::Fast).is_ok());
        }
    }

    // ------------------------------------------------------------------
    // Fast vs Full
    // ------------------------------------------------------------------

    #[test]
    fn fast_skips_signatures() {
        let mut v = validator();
        let g = genesis();
        // Unsigned user tx: invalid under Full, fine under Fast.
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), COIN)],
            1,
            TxTag::Transaction,
            Some(NOW + 60_000),
            Some("n1".into()),
            None,
        )
        .unwrap();
        tx.compute_id().unwrap();

        let b1 = child_of(&g, vec![tx], NOW + 60_000);
        assert!(v.validate(&b1, &ctx(Some(&g), NOW + 60_000), ValidationMode::Fast).is_ok());
        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), NOW + 60_000), ValidationMode::Full).unwrap_err(),
            BlockError::TransactionError { .. }
        ));
    }

    #[test]
    fn fast_still_checks_merkle() {
        let mut v = validator();
        let g = genesis();
        let mut b1 = child_of(&g, vec![], NOW + 60_000);
        b1.merkle_root = Hash256([0xEE; 32]);
        assert_eq!(
            v.validate(&b1, &ctx(Some(&g), NOW + 60_000), ValidationMode::Fast).unwrap_err(),
            BlockError::InvalidMerkleRoot
        );
    }

    #[test]
    fn full_valid_signed_block_passes() {
        let mut v = validator();
        let g = genesis();
        let kp = KeyPair::generate();
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), COIN)],
            1,
            TxTag::Transaction,
            Some(NOW + 60_000),
            Some("n1".into()),
            None,
        )
        .unwrap();
        tx.sign(&kp).unwrap();
        tx.compute_id().unwrap();

        let b1 = child_of(&g, vec![tx], NOW + 60_000);
        assert!(v.validate(&b1, &ctx(Some(&g), NOW + 60_000), ValidationMode::Full).is_ok());
    }

    // ------------------------------------------------------------------
    // Coinbase value
    // ------------------------------------------------------------------

    #[test]
    fn coinbase_exact_value_passes() {
        let v = validator();
        let g = genesis();
        let b1 = child_of(&g, vec![], NOW + 60_000);
        assert!(v.check_coinbase_value(&b1, 50 * COIN).is_ok());
    }

    #[test]
    fn coinbase_overpay_rejected() {
        let v = validator();
        let g = genesis();
        let b1 = child_of(&g, vec![], NOW + 60_000);
        // Block mints 50; claim the reward is 49 → mismatch of 1.
        assert_eq!(
            v.check_coinbase_value(&b1, 50 * COIN - 1).unwrap_err(),
            BlockError::CoinbaseAmountMismatch {
                got: 50 * COIN,
                expected: 50 * COIN - 1,
            }
        );
    }

    #[test]
    fn coinbase_includes_fees() {
        let mut v = validator();
        let g = genesis();
        let kp = KeyPair::generate();
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), COIN)],
            3,
            TxTag::Transaction,
            Some(NOW + 60_000),
            Some("n1".into()),
            None,
        )
        .unwrap();
        tx.sign(&kp).unwrap();
        tx.compute_id().unwrap();

        // child_of mints reward + fees, so the equation balances.
        let b1 = child_of(&g, vec![tx], NOW + 60_000);
        assert!(v.check_coinbase_value(&b1, 50 * COIN).is_ok());
        assert!(v.validate(&b1, &ctx(Some(&g), NOW + 60_000), ValidationMode::Full).is_ok());
    }

    // ------------------------------------------------------------------
    // CPU guard
    // ------------------------------------------------------------------

    #[test]
    fn batch_too_large_rejected() {
        let policy = GuardPolicy { max_tx_per_batch: 1, ..GuardPolicy::default() };
        let mut v = BlockValidator::new(Box::new(SeededKawpow::new()), policy);
        let g = genesis();
        let kp = KeyPair::generate();
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), COIN)],
            1,
            TxTag::Transaction,
            Some(NOW + 60_000),
            Some("n1".into()),
            None,
        )
        .unwrap();
        tx.sign(&kp).unwrap();
        tx.compute_id().unwrap();
        let b1 = child_of(&g, vec![tx], NOW + 60_000);

        assert!(matches!(
            v.validate(&b1, &ctx(Some(&g), NOW + 60_000), ValidationMode::Full).unwrap_err(),
            BlockError::BatchTooLarge { count: 2, max: 1 }
        ));
    }

    #[test]
    fn rate_limit_rejects_excess_calls() {
        let policy = GuardPolicy { rate_limit_per_second: 3, ..GuardPolicy::default() };
        let mut v = BlockValidator::new(Box::new(SeededKawpow::new()), policy);
        let g = genesis();

        for _ in 0..3 {
            assert!(v.validate(&g, &ctx(None, NOW), ValidationMode::UltraFast).is_ok());
        }
        assert_eq!(
            v.validate(&g, &ctx(None, NOW), ValidationMode::UltraFast).unwrap_err(),
            BlockError::RateLimited
        );

        // Caller retries after the window resets.
        v.reset_rate_window();
        assert!(v.validate(&g, &ctx(None, NOW), ValidationMode::UltraFast).is_ok());
    }

    #[test]
    fn disabled_guard_never_limits() {
        let policy = GuardPolicy {
            enabled: false,
            rate_limit_per_second: 1,
            max_tx_per_batch: 0,
            ..GuardPolicy::default()
        };
        let mut v = BlockValidator::new(Box::new(SeededKawpow::new()), policy);
        let g = genesis();
        for _ in 0..10 {
            assert!(v.validate(&g, &ctx(None, NOW), ValidationMode::UltraFast).is_ok());
        }
    }
}
