//! Difficulty retargeting.
//!
//! A mean-interval rule over a trailing window: when blocks arrive at less
//! than half the target pace the difficulty steps up by ×1.5, when they
//! arrive slower than 1.5× the target pace it steps down by ×0.75, clamped
//! to the configured floor. No adjustment happens until the chain holds a
//! full window plus one parent timestamp.

use sable_core::block::Block;

/// Retarget tunables, taken from the blockchain config section.
#[derive(Clone, Copy, Debug)]
pub struct RetargetPolicy {
    /// Target inter-block time in milliseconds.
    pub target_block_time_ms: u64,
    /// Number of trailing intervals inspected.
    pub window: u64,
    /// Difficulty floor.
    pub minimum: u64,
}

/// Next difficulty from a window of block timestamps.
///
/// `timestamps` must be ordered oldest to newest and cover `window`
/// intervals (`window + 1` entries). Fewer than 2 entries leaves the
/// difficulty unchanged.
pub fn next_difficulty(timestamps: &[u64], current: u64, policy: &RetargetPolicy) -> u64 {
    if timestamps.len() < 2 {
        return current.max(policy.minimum);
    }

    let intervals = (timestamps.len() - 1) as u64;
    let span = timestamps[timestamps.len() - 1].saturating_sub(timestamps[0]);
    let mean = span / intervals;

    let adjusted = if mean < policy.target_block_time_ms / 2 {
        // Blocks coming in fast: raise difficulty to floor(current × 1.5).
        current.saturating_add(current / 2)
    } else if mean > policy.target_block_time_ms + policy.target_block_time_ms / 2 {
        // Blocks dragging: ease off to floor(current × 0.75). Multiply
        // before dividing in u128 so the floor is exact and `× 3` cannot
        // overflow near u64::MAX.
        ((current as u128 * 3) / 4) as u64
    } else {
        current
    };

    adjusted.max(policy.minimum)
}

/// Retarget from the chain tip.
///
/// Returns `current` untouched while the chain is shorter than
/// `window + 1` blocks; afterwards applies [`next_difficulty`] over the
/// trailing `window + 1` timestamps.
pub fn retarget(chain: &[Block], current: u64, policy: &RetargetPolicy) -> u64 {
    let needed = (policy.window + 1) as usize;
    if chain.len() < needed {
        return current.max(policy.minimum);
    }
    let timestamps: Vec<u64> = chain[chain.len() - needed..]
        .iter()
        .map(|b| b.timestamp)
        .collect();
    next_difficulty(&timestamps, current, policy)
}
