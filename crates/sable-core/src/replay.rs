//! Historical replay index over committed transactions.
//!
//! Two structures: the set of every committed transaction ID, and a map from
//! `(nonce, sender fingerprint)` to the committing record. A resubmission is
//! a replay when either its ID or its (nonce, sender) pair has already been
//! committed. Persisted alongside the chain snapshot and rebuilt from the
//! chain when absent.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::block::Block;
use crate::transaction::Transaction;
use crate::types::Hash256;

/// Committed entry for a `(nonce, sender)` pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayRecord {
    pub tx_id: Hash256,
    pub block_height: u64,
    /// Commit timestamp in Unix milliseconds.
    pub timestamp: u64,
    pub nonce: String,
    /// Sender fingerprint (first 16 hex chars of the pubkey hash).
    pub sender_address: String,
}

/// Aggregate counters surfaced through the status contract.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReplayStats {
    pub tracked_ids: usize,
    pub tracked_nonces: usize,
}

/// Index of committed transaction identities.
#[derive(Default, Debug)]
pub struct ReplayIndex {
    tx_ids: HashSet<Hash256>,
    by_nonce: HashMap<String, ReplayRecord>,
}

impl ReplayIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map key for a `(nonce, sender)` pair.
    fn key(nonce: &str, sender: &str) -> String {
        format!("{nonce}:{sender}")
    }

    /// Record every transaction of a committed block.
    ///
    /// Non-coinbase transactions with a nonce land in the nonce map keyed by
    /// the first input's sender fingerprint; every identified transaction
    /// lands in the ID set.
    pub fn record(&mut self, block: &Block) {
        for tx in &block.transactions {
            let Some(id) = tx.id() else { continue };
            self.tx_ids.insert(id);

            if tx.is_coinbase() {
                continue;
            }
            let (Some(nonce), Some(sender)) = (tx.nonce(), tx.sender_fingerprint()) else {
                continue;
            };
            self.by_nonce.insert(
                Self::key(nonce, &sender),
                ReplayRecord {
                    tx_id: id,
                    block_height: block.index,
                    timestamp: tx.timestamp(),
                    nonce: nonce.to_string(),
                    sender_address: sender,
                },
            );
        }
    }

    /// Whether submitting `tx` would replay committed history.
    ///
    /// True for any non-coinbase transaction that is missing its nonce, has
    /// a committed ID, or matches a committed (nonce, sender) pair.
    pub fn is_replay(&self, tx: &Transaction) -> bool {
        if tx.is_coinbase() {
            return false;
        }
        let Some(nonce) = tx.nonce() else {
            // No replay protection at all: treat as a replay outright.
            return true;
        };
        if tx.id().is_some_and(|id| self.tx_ids.contains(&id)) {
            return true;
        }
        tx.sender_fingerprint()
            .is_some_and(|sender| self.by_nonce.contains_key(&Self::key(nonce, &sender)))
    }

    /// Look up the committed record for a (nonce, sender) pair.
    pub fn get(&self, nonce: &str, sender: &str) -> Option<&ReplayRecord> {
        self.by_nonce.get(&Self::key(nonce, sender))
    }

    pub fn contains_id(&self, id: &Hash256) -> bool {
        self.tx_ids.contains(id)
    }

    pub fn stats(&self) -> ReplayStats {
        ReplayStats {
            tracked_ids: self.tx_ids.len(),
            tracked_nonces: self.by_nonce.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tx_ids.is_empty() && self.by_nonce.is_empty()
    }

    /// Clear and re-record every block of `chain`.
    pub fn rebuild(&mut self, chain: &[Block]) {
        self.tx_ids.clear();
        self.by_nonce.clear();
        for block in chain {
            self.record(block);
        }
    }

    // --- Snapshot form ---

    /// Nonce-map entries as `[key, record]` pairs, sorted by key for a
    /// deterministic snapshot.
    pub fn entries(&self) -> Vec<(String, ReplayRecord)> {
        let mut list: Vec<(String, ReplayRecord)> = self
            .by_nonce
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        list.sort_by(|a, b| a.0.cmp(&b.0));
        list
    }

    /// Committed transaction IDs, sorted for a deterministic snapshot.
    pub fn ids(&self) -> Vec<Hash256> {
        let mut list: Vec<Hash256> = self.tx_ids.iter().copied().collect();
        list.sort();
        list
    }

    /// Restore from snapshot form.
    pub fn from_parts(entries: Vec<(String, ReplayRecord)>, ids: Vec<Hash256>) -> Self {
        Self {
            tx_ids: ids.into_iter().collect(),
            by_nonce: entries.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::constants::COIN;
    use crate::crypto::{self, KeyPair};
    use crate::transaction::{TxInput, TxOutput};
    use crate::types::{Algorithm, PrevHash, TxTag};

    const NOW: u64 = 1_700_000_000_000;

    fn coinbase(nonce: &str) -> Transaction {
        let mut tx = Transaction::coinbase(
            vec![TxOutput::new(Address::new("addr_M").unwrap(), 50 * COIN)],
            TxTag::Coinbase,
            Some(NOW),
            Some(nonce.into()),
            None,
        )
        .unwrap();
        tx.compute_id().unwrap();
        tx
    }

    fn user_tx(kp: &KeyPair, nonce: &str, fee: u64) -> Transaction {
        let mut tx = Transaction::new(
            vec![TxInput::unsigned(Hash256([0x11; 32]), 0, vec![])],
            vec![TxOutput::new(Address::new("addr_Y").unwrap(), COIN)],
            fee,
            TxTag::Transaction,
            Some(NOW),
            Some(nonce.into()),
            None,
        )
        .unwrap();
        tx.sign(kp).unwrap();
        tx.compute_id().unwrap();
        tx
    }

    fn block_with(index: u64, txs: Vec<Transaction>) -> Block {
        let prev = if index == 0 {
            PrevHash::Genesis
        } else {
            PrevHash::Block(Hash256([index as u8; 32]))
        };
        Block::new(index, NOW, txs, prev, 0, 1, Algorithm::Sha256, NOW).unwrap()
    }

    // ------------------------------------------------------------------
    // record / is_replay
    // ------------------------------------------------------------------

    #[test]
    fn committed_id_is_replay() {
        let kp = KeyPair::generate();
        let tx = user_tx(&kp, "n1", 5);
        let mut index = ReplayIndex::new();
        index.record(&block_with(1, vec![coinbase("g1"), tx.clone()]));

        assert!(index.is_replay(&tx));
        assert!(index.contains_id(&tx.id().unwrap()));
    }

    #[test]
    fn committed_nonce_and_sender_is_replay() {
        let kp = KeyPair::generate();
        let committed = user_tx(&kp, "n1", 5);
        let mut index = ReplayIndex::new();
        index.record(&block_with(1, vec![coinbase("g1"), committed]));

        // Fresh tx, different id, same nonce + sender.
        let retry = user_tx(&kp, "n1", 6);
        assert!(index.is_replay(&retry));
    }

    #[test]
    fn fresh_nonce_same_sender_is_not_replay() {
        let kp = KeyPair::generate();
        let mut index = ReplayIndex::new();
        index.record(&block_with(1, vec![coinbase("g1"), user_tx(&kp, "n1", 5)]));

        assert!(!index.is_replay(&user_tx(&kp, "n2", 5)));
    }

    #[test]
    fn same_nonce_different_sender_is_not_replay() {
        let mut index = ReplayIndex::new();
        index.record(&block_with(
            1,
            vec![coinbase("g1"), user_tx(&KeyPair::from_secret_bytes([1; 32]), "n1", 5)],
        ));

        assert!(!index.is_replay(&user_tx(&KeyPair::from_secret_bytes([2; 32]), "n1", 5)));
    }

    #[test]
    fn missing_nonce_counts_as_replay() {
        let kp = KeyPair::generate();
        let mut tx = user_tx(&kp, "n1", 5);
        // Strip the nonce after the fact to simulate a malformed submission.
        let mut v = serde_json::to_value(&tx).unwrap();
        v.as_object_mut().unwrap().remove("nonce");
        tx = serde_json::from_value(v).unwrap();

        let index = ReplayIndex::new();
        assert!(index.is_replay(&tx));
    }

    #[test]
    fn coinbase_is_never_replay() {
        let mut index = ReplayIndex::new();
        let cb = coinbase("g1");
        index.record(&block_with(0, vec![cb.clone()]));
        assert!(!index.is_replay(&cb));
    }

    #[test]
    fn record_stores_sender_fingerprint() {
        let kp = KeyPair::generate();
        let tx = user_tx(&kp, "n1", 5);
        let sender = crypto::sender_fingerprint(&kp.public_key().to_bytes());
        let mut index = ReplayIndex::new();
        index.record(&block_with(3, vec![coinbase("g1"), tx.clone()]));

        let rec = index.get("n1", &sender).unwrap();
        assert_eq!(rec.tx_id, tx.id().unwrap());
        assert_eq!(rec.block_height, 3);
        assert_eq!(rec.nonce, "n1");
        assert_eq!(rec.sender_address, sender);
    }

    // ------------------------------------------------------------------
    // rebuild
    // ------------------------------------------------------------------

    #[test]
    fn rebuild_replaces_state() {
        let kp = KeyPair::generate();
        let tx_old = user_tx(&kp, "old", 5);
        let tx_new = user_tx(&kp, "new", 5);

        let mut index = ReplayIndex::new();
        index.record(&block_with(1, vec![coinbase("g1"), tx_old.clone()]));

        let chain = vec![block_with(1, vec![coinbase("g2"), tx_new.clone()])];
        index.rebuild(&chain);

        assert!(!index.is_replay(&tx_old));
        assert!(index.is_replay(&tx_new));
    }

    // ------------------------------------------------------------------
    // Snapshot round-trip
    // ------------------------------------------------------------------

    #[test]
    fn snapshot_parts_roundtrip() {
        let kp = KeyPair::generate();
        let tx = user_tx(&kp, "n1", 5);
        let mut index = ReplayIndex::new();
        index.record(&block_with(1, vec![coinbase("g1"), tx.clone()]));

        let restored = ReplayIndex::from_parts(index.entries(), index.ids());
        assert!(restored.is_replay(&tx));
        assert_eq!(restored.stats(), index.stats());
    }

    #[test]
    fn entries_and_ids_sorted() {
        let mut index = ReplayIndex::new();
        for seed in [9u8, 3, 7] {
            let kp = KeyPair::from_secret_bytes([seed; 32]);
            index.record(&block_with(1, vec![coinbase(&format!("g{seed}")), user_tx(&kp, "n", 5)]));
        }
        let entries = index.entries();
        let mut sorted = entries.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(entries, sorted);

        let ids = index.ids();
        let mut ids_sorted = ids.clone();
        ids_sorted.sort();
        assert_eq!(ids, ids_sorted);
    }

    #[test]
    fn stats_count_both_structures() {
        let kp = KeyPair::generate();
        let mut index = ReplayIndex::new();
        index.record(&block_with(1, vec![coinbase("g1"), user_tx(&kp, "n1", 5)]));
        let stats = index.stats();
        assert_eq!(stats.tracked_ids, 2); // coinbase + user tx
        assert_eq!(stats.tracked_nonces, 1);
    }
}
