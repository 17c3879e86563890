//! Error types for the Sable protocol.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("invalid format: {0}")] InvalidFormat(String),
    #[error("missing replay protection (nonce/expiry)")] MissingReplayProtection,
    #[error("transaction expired at {expires_at}, now {now}")] Expired { expires_at: u64, now: u64 },
    #[error("invalid signature on input {index}")] SignatureInvalid { index: usize },
    #[error("fee too low: {fee} < minimum {minimum}")] FeeBelowMinimum { fee: u64, minimum: u64 },
    #[error("transaction is frozen after id derivation")] Immutable,
    #[error("insufficient balance: have {have}, need {need}")] InsufficientBalance { have: u64, need: u64 },
    #[error("value overflow")] ValueOverflow,
    #[error("reserved tag {0} on a user transaction")] ReservedTag(String),
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("timestamp out of bounds: drift {drift_ms} ms")] TimestampOutOfBounds { drift_ms: i64 },
    #[error("timestamp too close to parent: interval {interval_ms} ms")] TimestampTooCloseToPrev { interval_ms: i64 },
    #[error("proof of work above target")] PoWInsufficient,
    #[error("hash mismatch against recomputed value")] HashMismatch,
    #[error("invalid merkle root")] InvalidMerkleRoot,
    #[error("coinbase amount mismatch: got {got}, expected {expected}")] CoinbaseAmountMismatch { got: u64, expected: u64 },
    #[error("no coinbase transaction")] NoCoinbase,
    #[error("first transaction is not coinbase")] FirstTxNotCoinbase,
    #[error("coinbase transaction at position {0}")] MisplacedCoinbase(usize),
    #[error("linkage mismatch: {0}")] LinkageMismatch(String),
    #[error("difficulty must be positive")] ZeroDifficulty,
    #[error("transaction {0} has no id")] MissingTxId(usize),
    #[error("batch too large: {count} > {max}")] BatchTooLarge { count: usize, max: usize },
    #[error("validation rate limited")] RateLimited,
    #[error("tx error in {index}: {source}")] TransactionError { index: usize, source: TransactionError },
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MempoolError {
    #[error("transaction already in pool: {0}")] AlreadyExists(String),
    #[error("replay detected: {0}")] ReplayDetected(String),
    #[error("pool full: {count} >= {max}")] PoolFull { count: usize, max: usize },
    #[error("pool memory exceeded: {bytes} + {incoming} > {max}")] PoolMemoryExceeded { bytes: usize, incoming: usize, max: usize },
    #[error("rate limited: {0}")] RateLimited(String),
    #[error("rejected: {0}")] Rejected(#[from] TransactionError),
    #[error("internal: {0}")] Internal(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("missing utxo: {0}")] MissingUtxo(String),
    #[error("transaction without id in block {0}")] UnidentifiedTransaction(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid signature bytes")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("empty address")] Empty,
    #[error("address too long: {0} chars")] TooLong(usize),
    #[error("invalid character: {0}")] InvalidCharacter(char),
    #[error("invalid base58 payload")] InvalidPayload,
    #[error("invalid checksum")] InvalidChecksum,
    #[error("invalid version: {0}")] InvalidVersion(u8),
}
