//! Merkle root over transaction IDs.
//!
//! Layers reduce pairwise through [`double_hash`]; a layer with an odd count
//! duplicates its last element. The empty tree has the zero hash as its root.

use crate::crypto::double_hash;
use crate::types::Hash256;

/// Hash two adjacent nodes into their parent: `H(left ‖ right)`.
fn node_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    double_hash(&data)
}

/// Compute the merkle root of a list of transaction IDs.
///
/// Returns [`Hash256::ZERO`] for an empty slice. A single leaf is its own
/// root.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }

    let mut current = leaves.to_vec();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    current[0]
}

/// Reduce one layer to the next, duplicating the last element on odd counts.
fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(node_hash(left, right));
        i += 2;
    }
    next
}
