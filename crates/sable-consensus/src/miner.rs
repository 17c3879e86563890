//! Nonce search over an assembled block template.
//!
//! The engine builds the template (coinbase, selected transactions, merkle
//! root); this module drives the proof-of-work loop: for each candidate
//! nonce, derive the hash for the block's algorithm and stop when it meets
//! the mining target. Bounded by an attempt budget so callers keep control
//! of scheduling.

use tracing::debug;

use sable_core::block::{hash_meets_target, Block, PowHasher};
use sable_core::types::Algorithm;

/// Outcome of one bounded mining run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MiningOutcome {
    /// A nonce satisfying the target was found; the block carries it.
    Solved { attempts: u64 },
    /// The attempt budget ran out; resume from `next_nonce`.
    Exhausted { next_nonce: u64 },
}

/// Search nonces from `block.nonce` upward for at most `max_attempts`.
///
/// On success the block's `nonce` and `hash` are updated in place. KawPow
/// hashes come from the collaborator; SHA-256 hashes from the canonical
/// header.
pub fn mine(block: &mut Block, hasher: &dyn PowHasher, max_attempts: u64) -> MiningOutcome {
    let target = block.mining_target();

    for attempt in 0..max_attempts {
        let candidate = match block.algorithm {
            Algorithm::Kawpow => {
                hasher.expected_hash(block.index, &block.previous_hash, block.nonce)
            }
            Algorithm::Sha256 => block.compute_hash(),
        };
        if hash_meets_target(&candidate, &target) {
            block.hash = candidate;
            debug!(index = block.index, nonce = block.nonce, attempts = attempt + 1, "block solved");
            return MiningOutcome::Solved { attempts: attempt + 1 };
        }
        block.nonce = block.nonce.wrapping_add(1);
    }

    MiningOutcome::Exhausted { next_nonce: block.nonce }
}
