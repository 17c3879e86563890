//! Engine-level error type.

use thiserror::Error;

use sable_consensus::checkpoint::CheckpointError;
use sable_core::error::{BlockError, LedgerError, MempoolError, TransactionError};

#[derive(Error, Debug)]
pub enum ChainError {
    #[error(transparent)] Block(#[from] BlockError),
    #[error(transparent)] Transaction(#[from] TransactionError),
    #[error(transparent)] Mempool(#[from] MempoolError),
    #[error(transparent)] Ledger(#[from] LedgerError),
    #[error(transparent)] Checkpoint(#[from] CheckpointError),
    #[error("duplicate block: {0}")] DuplicateBlock(String),
    #[error("io: {0}")] Io(String),
}

impl ChainError {
    /// Whether this error must terminate the process (checkpoint violation).
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::Checkpoint(e) if e.is_fatal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::types::Hash256;

    #[test]
    fn checkpoint_violation_is_fatal() {
        let err: ChainError = CheckpointError::Violation {
            height: 1,
            expected: Hash256([0xAA; 32]),
            actual: Hash256([0xBB; 32]),
            block_timestamp: 0,
        }
        .into();
        assert!(err.is_fatal());
    }

    #[test]
    fn other_errors_are_recoverable() {
        let err: ChainError = BlockError::PoWInsufficient.into();
        assert!(!err.is_fatal());
        let err: ChainError = CheckpointError::DuplicateHeight(1).into();
        assert!(!err.is_fatal());
        assert!(!ChainError::DuplicateBlock("ab".into()).is_fatal());
    }
}
