//! Proof-of-work hashing seam.
//!
//! KawPow is a black-box collaborator: given the header's mining inputs it
//! produces the hash the miner should have stored, and validation compares
//! that against the block. [`SeededKawpow`] is the in-repo implementation:
//! deterministic double-SHA-256 keyed by an epoch seed derived from the
//! block index. It preserves the verification shape (recompute, compare,
//! then check the target) without shipping the real DAG machinery.

use sable_core::block::PowHasher;
use sable_core::crypto::double_hash;
use sable_core::types::{Hash256, PrevHash};

/// Blocks per seed epoch.
pub const EPOCH_LENGTH: u64 = 7_500;

/// Deterministic KawPow stand-in.
///
/// `expected_hash = H(seed(index) ‖ previous_hash ‖ nonce)` where
/// `seed(index) = H(epoch(index))`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SeededKawpow;

impl SeededKawpow {
    pub fn new() -> Self {
        Self
    }

    /// Epoch seed for a block index.
    pub fn seed_for(&self, index: u64) -> Hash256 {
        double_hash(&(index / EPOCH_LENGTH).to_be_bytes())
    }
}

impl PowHasher for SeededKawpow {
    fn expected_hash(&self, index: u64, previous_hash: &PrevHash, nonce: u64) -> Hash256 {
        let seed = self.seed_for(index);
        let mut data = Vec::with_capacity(32 + 64 + 8);
        data.extend_from_slice(seed.as_bytes());
        data.extend_from_slice(previous_hash.to_string().as_bytes());
        data.extend_from_slice(&nonce.to_be_bytes());
        double_hash(&data)
    }
}
