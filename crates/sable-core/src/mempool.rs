//! In-memory pool of pending transactions.
//!
//! Entries are keyed by transaction ID and indexed by a priority key of
//! (fee desc, timestamp asc, id asc), which is also the block selection
//! order. The pool is bounded by a transaction count and a memory budget;
//! [`Mempool::manage`] enforces both after the fact, [`Mempool::add`] at
//! admission time.
//!
//! Committed-state replay checks and spam accounting run on the engine's
//! write path before admission; the pool itself rejects duplicates,
//! pool-local replays, invalid transactions, and limit violations.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::block::Block;
use crate::error::{MempoolError, TransactionError};
use crate::transaction::Transaction;
use crate::types::Hash256;

/// Priority key: ascending iteration yields fee desc, timestamp asc, id asc.
type PriorityKey = (Reverse<u64>, u64, Hash256);

/// Admission and capacity limits, derived from node configuration.
#[derive(Clone, Debug)]
pub struct MempoolLimits {
    /// Maximum number of pooled transactions.
    pub max_pool_size: usize,
    /// Maximum total serialized bytes of pooled transactions.
    pub max_memory_bytes: usize,
    /// Minimum fee for admission, in motes.
    pub min_fee: u64,
    /// Serialized-size ceiling of one transaction, in bytes.
    pub max_tx_bytes: usize,
}

/// A pooled transaction with its recorded serialized size.
#[derive(Clone, Debug)]
pub struct PoolEntry {
    pub tx: Transaction,
    pub size: usize,
}

/// Bounded, priority-ordered set of pending transactions.
#[derive(Debug)]
pub struct Mempool {
    entries: HashMap<Hash256, PoolEntry>,
    by_priority: BTreeSet<PriorityKey>,
    memory_bytes: usize,
    limits: MempoolLimits,
}

impl Mempool {
    pub fn new(limits: MempoolLimits) -> Self {
        Self {
            entries: HashMap::new(),
            by_priority: BTreeSet::new(),
            memory_bytes: 0,
            limits,
        }
    }

    fn priority_key(tx: &Transaction, id: Hash256) -> PriorityKey {
        (Reverse(tx.fee()), tx.timestamp(), id)
    }

    /// Admit a frozen, valid transaction.
    ///
    /// Rejects duplicates, pool-local replays (same nonce + sender key set),
    /// invalid transactions, oversized transactions, and pool limit
    /// violations. Returns the transaction ID on success.
    pub fn add(&mut self, tx: Transaction, now: u64) -> Result<Hash256, MempoolError> {
        let id = tx
            .id()
            .ok_or_else(|| MempoolError::Internal("transaction has no id".into()))?;

        if self.entries.contains_key(&id) {
            return Err(MempoolError::AlreadyExists(id.to_hex()));
        }

        tx.validate(self.limits.min_fee, now)?;

        if !tx.is_coinbase() && tx.is_replay_of(self.entries.values().map(|e| &e.tx)) {
            return Err(MempoolError::ReplayDetected(id.to_hex()));
        }

        if self.entries.len() >= self.limits.max_pool_size {
            return Err(MempoolError::PoolFull {
                count: self.entries.len(),
                max: self.limits.max_pool_size,
            });
        }

        let size = tx.serialized_size();
        if size > self.limits.max_tx_bytes {
            return Err(MempoolError::Rejected(TransactionError::InvalidFormat(
                format!("oversized transaction: {size} > {}", self.limits.max_tx_bytes),
            )));
        }
        if self.memory_bytes + size > self.limits.max_memory_bytes {
            return Err(MempoolError::PoolMemoryExceeded {
                bytes: self.memory_bytes,
                incoming: size,
                max: self.limits.max_memory_bytes,
            });
        }

        self.by_priority.insert(Self::priority_key(&tx, id));
        self.memory_bytes += size;
        self.entries.insert(id, PoolEntry { tx, size });
        Ok(id)
    }

    /// Remove a transaction by ID, returning it if present.
    pub fn remove(&mut self, id: &Hash256) -> Option<PoolEntry> {
        let entry = self.entries.remove(id)?;
        self.by_priority.remove(&Self::priority_key(&entry.tx, *id));
        self.memory_bytes -= entry.size;
        Some(entry)
    }

    /// Drop every transaction included in `block`.
    pub fn remove_included(&mut self, block: &Block) {
        for tx in &block.transactions {
            if let Some(id) = tx.id() {
                self.remove(&id);
            }
        }
    }

    /// Drop expired transactions. Returns how many were removed.
    pub fn cleanup_expired(&mut self, now: u64) -> usize {
        let expired: Vec<Hash256> = self
            .entries
            .iter()
            .filter(|(_, e)| e.tx.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.remove(id);
        }
        if !expired.is_empty() {
            debug!(count = expired.len(), "mempool: dropped expired transactions");
        }
        expired.len()
    }

    /// Enforce pool bounds.
    ///
    /// Over the count bound: drop lowest-fee transactions first. Over the
    /// memory bound: drop the oldest-by-timestamp 10% of transactions.
    pub fn manage(&mut self) {
        while self.entries.len() > self.limits.max_pool_size {
            let Some(&(_, _, id)) = self.by_priority.iter().next_back() else {
                break;
            };
            self.remove(&id);
        }

        if self.memory_bytes > self.limits.max_memory_bytes && !self.entries.is_empty() {
            let mut by_age: Vec<(u64, Hash256)> = self
                .entries
                .iter()
                .map(|(id, e)| (e.tx.timestamp(), *id))
                .collect();
            by_age.sort();
            let drop_count = by_age.len().div_ceil(10);
            for (_, id) in by_age.into_iter().take(drop_count) {
                self.remove(&id);
            }
            debug!(
                count = drop_count,
                bytes = self.memory_bytes,
                "mempool: dropped oldest transactions over memory bound"
            );
        }
    }

    /// Select transactions for a block template in priority order,
    /// stopping once `max_bytes` or `max_count` would be exceeded.
    pub fn select_for_block(&self, max_bytes: usize, max_count: usize) -> Vec<Transaction> {
        let mut selected = Vec::new();
        let mut budget = max_bytes;

        for &(_, _, id) in &self.by_priority {
            if selected.len() >= max_count {
                break;
            }
            let Some(entry) = self.entries.get(&id) else {
                continue;
            };
            if entry.size > budget {
                break;
            }
            budget -= entry.size;
            selected.push(entry.tx.clone());
        }
        selected
    }

    pub fn contains(&self, id: &Hash256) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &Hash256) -> Option<&Transaction> {
        self.entries.get(id).map(|e| &e.tx)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total recorded serialized bytes in the pool.
    pub fn memory_bytes(&self) -> usize {
        self.memory_bytes
    }

    pub fn limits(&self) -> &MempoolLimits {
        &self.limits
    }

    /// All pooled transactions in priority order (snapshot persistence).
    pub fn transactions(&self) -> Vec<Transaction> {
        self.by_priority
            .iter()
            .filter_map(|&(_, _, id)| self.entries.get(&id))
            .map(|e| e.tx.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.by_priority.clear();
        self.memory_bytes = 0;
    }
}

/// Per-transaction processing locks with auto-expiry.
///
/// Prevents one transaction from being handled by two flows concurrently.
/// Locks silently expire after the timeout so a crashed flow cannot wedge a
/// transaction forever.
#[derive(Debug)]
pub struct TxLocks {
    held: HashMap<Hash256, u64>,
    timeout_ms: u64,
}

impl TxLocks {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            held: HashMap::new(),
            timeout_ms,
        }
    }

    /// Try to acquire the lock for `id` at instant `now` (ms).
    /// Returns `false` while another holder's lock is still live.
    pub fn acquire(&mut self, id: Hash256, now: u64) -> bool {
        match self.held.get(&id) {
            Some(&since) if now < since + self.timeout_ms => false,
            _ => {
                self.held.insert(id, now);
                true
            }
        }
    }

    pub fn release(&mut self, id: &Hash256) {
        self.held.remove(id);
    }

    /// Drop expired locks.
    pub fn prune(&mut self, now: u64) {
        let timeout = self.timeout_ms;
        self.held.retain(|_, since| now < *since + timeout);
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::constants::COIN;
    use crate::crypto::KeyPair;
    use crate::transaction::{TxInput, TxOutput};
    use crate::types::{Algorithm, PrevHash, TxTag};

    const NOW: u64 = 1_700_000_000_000;

    fn limits() -> MempoolLimits {
        MempoolLimits {
            max_pool_size: 100,
            max_memory_bytes: 1_000_000,
            min_fee: 1,
            max_tx_bytes: 100_000,
        }
    }

    fn tx_with(kp: &KeyPair, fee: u64, timestamp: u64, nonce: &str) -> Transaction {
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), 10 * COIN)],
            fee,
            TxTag::Transaction,
            Some(timestamp),
            Some(nonce.into()),
            None,
        )
        .unwrap();
        tx.sign(kp).unwrap();
        tx.compute_id().unwrap();
        tx
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    #[test]
    fn add_and_get() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let tx = tx_with(&kp, 5, NOW, "n1");
        let size = tx.serialized_size();

        let id = pool.add(tx.clone(), NOW).unwrap();
        assert!(pool.contains(&id));
        assert_eq!(pool.get(&id), Some(&tx));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.memory_bytes(), size);
    }

    #[test]
    fn rejects_duplicate_id() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let tx = tx_with(&kp, 5, NOW, "n1");
        pool.add(tx.clone(), NOW).unwrap();
        assert!(matches!(
            pool.add(tx, NOW).unwrap_err(),
            MempoolError::AlreadyExists(_)
        ));
    }

    #[test]
    fn rejects_unfrozen_tx() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), COIN)],
            5,
            TxTag::Transaction,
            Some(NOW),
            Some("n".into()),
            None,
        )
        .unwrap();
        tx.sign(&kp).unwrap();
        assert!(matches!(
            pool.add(tx, NOW).unwrap_err(),
            MempoolError::Internal(_)
        ));
    }

    #[test]
    fn rejects_invalid_tx() {
        let mut pool = Mempool::new(MempoolLimits { min_fee: 10, ..limits() });
        let kp = KeyPair::generate();
        let tx = tx_with(&kp, 5, NOW, "n1");
        assert!(matches!(
            pool.add(tx, NOW).unwrap_err(),
            MempoolError::Rejected(TransactionError::FeeBelowMinimum { .. })
        ));
    }

    #[test]
    fn rejects_pool_replay_same_nonce() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        pool.add(tx_with(&kp, 5, NOW, "n1"), NOW).unwrap();
        // Different fee → different id, same nonce + sender.
        let err = pool.add(tx_with(&kp, 6, NOW, "n1"), NOW).unwrap_err();
        assert!(matches!(err, MempoolError::ReplayDetected(_)));
    }

    #[test]
    fn same_nonce_different_sender_coexists() {
        let mut pool = Mempool::new(limits());
        pool.add(tx_with(&KeyPair::from_secret_bytes([1; 32]), 5, NOW, "n1"), NOW)
            .unwrap();
        pool.add(tx_with(&KeyPair::from_secret_bytes([2; 32]), 5, NOW, "n1"), NOW)
            .unwrap();
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn rejects_when_full() {
        let mut pool = Mempool::new(MempoolLimits { max_pool_size: 1, ..limits() });
        let kp = KeyPair::generate();
        pool.add(tx_with(&kp, 5, NOW, "n1"), NOW).unwrap();
        assert!(matches!(
            pool.add(tx_with(&kp, 6, NOW, "n2"), NOW).unwrap_err(),
            MempoolError::PoolFull { .. }
        ));
    }

    #[test]
    fn rejects_over_memory_budget() {
        let kp = KeyPair::generate();
        let probe = tx_with(&kp, 5, NOW, "n1");
        let size = probe.serialized_size();
        let mut pool = Mempool::new(MempoolLimits {
            max_memory_bytes: size + size / 2,
            ..limits()
        });
        pool.add(probe, NOW).unwrap();
        assert!(matches!(
            pool.add(tx_with(&kp, 6, NOW, "n2"), NOW).unwrap_err(),
            MempoolError::PoolMemoryExceeded { .. }
        ));
    }

    #[test]
    fn rejects_oversized_tx() {
        let mut pool = Mempool::new(MempoolLimits { max_tx_bytes: 10, ..limits() });
        let kp = KeyPair::generate();
        assert!(matches!(
            pool.add(tx_with(&kp, 5, NOW, "n1"), NOW).unwrap_err(),
            MempoolError::Rejected(TransactionError::InvalidFormat(_))
        ));
    }

    // ------------------------------------------------------------------
    // Removal and pruning
    // ------------------------------------------------------------------

    #[test]
    fn remove_restores_memory_accounting() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let id = pool.add(tx_with(&kp, 5, NOW, "n1"), NOW).unwrap();
        assert!(pool.remove(&id).is_some());
        assert_eq!(pool.len(), 0);
        assert_eq!(pool.memory_bytes(), 0);
        assert!(pool.remove(&id).is_none());
    }

    #[test]
    fn remove_included_drops_block_txs() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let tx1 = tx_with(&kp, 5, NOW, "n1");
        let id1 = tx1.id().unwrap();
        let id2 = pool.add(tx_with(&kp, 6, NOW, "n2"), NOW).unwrap();
        pool.add(tx1.clone(), NOW).unwrap();

        let mut cb = Transaction::coinbase(
            vec![TxOutput::new(Address::new("addr_M").unwrap(), 50 * COIN)],
            TxTag::Coinbase,
            Some(NOW),
            None,
            None,
        )
        .unwrap();
        cb.compute_id().unwrap();
        let block = Block::new(
            0,
            NOW,
            vec![cb, tx1],
            PrevHash::Genesis,
            0,
            1,
            Algorithm::Sha256,
            NOW,
        )
        .unwrap();

        pool.remove_included(&block);
        assert!(!pool.contains(&id1));
        assert!(pool.contains(&id2));
    }

    #[test]
    fn cleanup_expired_drops_only_stale() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let old = tx_with(&kp, 5, NOW, "n1");
        let expiry = old.expires_at().unwrap();
        pool.add(old, NOW).unwrap();
        let fresh_id = pool.add(tx_with(&kp, 6, expiry, "n2"), expiry).unwrap();

        let removed = pool.cleanup_expired(expiry + 1);
        assert_eq!(removed, 1);
        assert!(pool.contains(&fresh_id));
        assert_eq!(pool.len(), 1);
    }

    // ------------------------------------------------------------------
    // manage()
    // ------------------------------------------------------------------

    #[test]
    fn manage_drops_lowest_fee_over_count() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let low = pool.add(tx_with(&kp, 1, NOW, "n1"), NOW).unwrap();
        let mid = pool.add(tx_with(&kp, 5, NOW, "n2"), NOW).unwrap();
        let high = pool.add(tx_with(&kp, 9, NOW, "n3"), NOW).unwrap();

        // Shrink the bound after the fact, then enforce.
        pool.limits.max_pool_size = 2;
        pool.manage();

        assert!(!pool.contains(&low));
        assert!(pool.contains(&mid));
        assert!(pool.contains(&high));
    }

    #[test]
    fn manage_drops_oldest_over_memory() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let oldest = pool.add(tx_with(&kp, 5, NOW - 5_000, "n1"), NOW).unwrap();
        for i in 0..9 {
            pool.add(tx_with(&kp, 5, NOW + i, &format!("m{i}")), NOW).unwrap();
        }
        assert_eq!(pool.len(), 10);

        pool.limits.max_memory_bytes = 1;
        pool.manage();

        // 10% of 10 = 1 dropped, the oldest one.
        assert_eq!(pool.len(), 9);
        assert!(!pool.contains(&oldest));
    }

    #[test]
    fn manage_noop_within_bounds() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        pool.add(tx_with(&kp, 5, NOW, "n1"), NOW).unwrap();
        pool.manage();
        assert_eq!(pool.len(), 1);
    }

    // ------------------------------------------------------------------
    // Selection order
    // ------------------------------------------------------------------

    #[test]
    fn selection_orders_fee_desc_then_time_then_id() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let low = pool.add(tx_with(&kp, 1, NOW, "n1"), NOW).unwrap();
        let high = pool.add(tx_with(&kp, 9, NOW, "n2"), NOW).unwrap();
        let mid_late = pool.add(tx_with(&kp, 5, NOW + 10, "n3"), NOW).unwrap();
        let mid_early = pool.add(tx_with(&kp, 5, NOW, "n4"), NOW).unwrap();

        let order: Vec<Hash256> = pool
            .select_for_block(usize::MAX, usize::MAX)
            .iter()
            .map(|tx| tx.id().unwrap())
            .collect();
        assert_eq!(order, vec![high, mid_early, mid_late, low]);
    }

    #[test]
    fn selection_id_tiebreak_is_lexicographic() {
        let mut pool = Mempool::new(limits());
        // Same fee/timestamp from two senders; order must be id-ascending.
        let a = pool
            .add(tx_with(&KeyPair::from_secret_bytes([1; 32]), 5, NOW, "n1"), NOW)
            .unwrap();
        let b = pool
            .add(tx_with(&KeyPair::from_secret_bytes([2; 32]), 5, NOW, "n2"), NOW)
            .unwrap();
        let (first, second) = if a.to_hex() < b.to_hex() { (a, b) } else { (b, a) };

        let order: Vec<Hash256> = pool
            .select_for_block(usize::MAX, usize::MAX)
            .iter()
            .map(|tx| tx.id().unwrap())
            .collect();
        assert_eq!(order, vec![first, second]);
    }

    #[test]
    fn selection_respects_byte_budget() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        let tx = tx_with(&kp, 9, NOW, "n1");
        let size = tx.serialized_size();
        pool.add(tx, NOW).unwrap();
        pool.add(tx_with(&kp, 5, NOW, "n2"), NOW).unwrap();

        let selected = pool.select_for_block(size, usize::MAX);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].fee(), 9);
    }

    #[test]
    fn selection_respects_count_cap() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        for i in 0..5 {
            pool.add(tx_with(&kp, 5 + i, NOW, &format!("n{i}")), NOW).unwrap();
        }
        assert_eq!(pool.select_for_block(usize::MAX, 3).len(), 3);
    }

    #[test]
    fn selection_empty_pool() {
        let pool = Mempool::new(limits());
        assert!(pool.select_for_block(usize::MAX, usize::MAX).is_empty());
    }

    // ------------------------------------------------------------------
    // Snapshot listing
    // ------------------------------------------------------------------

    #[test]
    fn transactions_returns_priority_order() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        pool.add(tx_with(&kp, 1, NOW, "n1"), NOW).unwrap();
        pool.add(tx_with(&kp, 9, NOW, "n2"), NOW).unwrap();
        let listed = pool.transactions();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].fee(), 9);
    }

    #[test]
    fn clear_resets_everything() {
        let mut pool = Mempool::new(limits());
        let kp = KeyPair::generate();
        pool.add(tx_with(&kp, 5, NOW, "n1"), NOW).unwrap();
        pool.clear();
        assert!(pool.is_empty());
        assert_eq!(pool.memory_bytes(), 0);
    }

    // ------------------------------------------------------------------
    // TxLocks
    // ------------------------------------------------------------------

    #[test]
    fn lock_acquire_release() {
        let mut locks = TxLocks::new(30_000);
        let id = Hash256([1; 32]);
        assert!(locks.acquire(id, NOW));
        assert!(!locks.acquire(id, NOW + 1));
        locks.release(&id);
        assert!(locks.acquire(id, NOW + 2));
    }

    #[test]
    fn lock_auto_expires() {
        let mut locks = TxLocks::new(30_000);
        let id = Hash256([1; 32]);
        assert!(locks.acquire(id, NOW));
        assert!(!locks.acquire(id, NOW + 29_999));
        assert!(locks.acquire(id, NOW + 30_000));
    }

    #[test]
    fn lock_prune_drops_stale() {
        let mut locks = TxLocks::new(30_000);
        locks.acquire(Hash256([1; 32]), NOW);
        locks.acquire(Hash256([2; 32]), NOW + 20_000);
        locks.prune(NOW + 30_000);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn independent_ids_do_not_contend() {
        let mut locks = TxLocks::new(30_000);
        assert!(locks.acquire(Hash256([1; 32]), NOW));
        assert!(locks.acquire(Hash256([2; 32]), NOW));
    }
}
