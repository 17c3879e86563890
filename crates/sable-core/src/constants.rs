//! Protocol constants. All monetary values are in motes (1 SBL = 10^8 motes),
//! all timestamps in Unix milliseconds.

pub const COIN: u64 = 100_000_000;

/// Default target spacing between blocks, in seconds.
pub const BLOCK_TIME_SECS: u64 = 60;

/// Default coinbase reward per block, in motes.
pub const COINBASE_REWARD: u64 = 50 * COIN;

/// Default number of trailing blocks inspected by the difficulty retarget.
pub const DIFFICULTY_WINDOW: u64 = 60;

/// Default minimum difficulty (retarget floor).
pub const DIFFICULTY_MINIMUM: u64 = 1;

/// Difficulty cap applied when mining the genesis block.
pub const GENESIS_MINING_DIFFICULTY_CAP: u64 = 1000;

/// Minimum accepted interval between consecutive blocks (1 second).
pub const MIN_BLOCK_INTERVAL_MS: u64 = 1_000;

/// Maximum accepted interval between consecutive blocks (1 hour).
pub const MAX_BLOCK_INTERVAL_MS: u64 = 3_600_000;

/// How far into the future a block timestamp may drift (2 minutes).
pub const MAX_FUTURE_DRIFT_MS: u64 = 120_000;

/// How far into the past a block timestamp may drift (24 hours).
pub const MAX_PAST_DRIFT_MS: u64 = 86_400_000;

/// Lifetime of a pending transaction before it expires (24 hours).
pub const TX_EXPIRY_MS: u64 = 86_400_000;

/// Serialized-size ceiling for a block's transaction payload, in bytes.
pub const MAX_BLOCK_BYTES: usize = 1_048_576;

/// Default minimum transaction fee, in motes.
pub const MIN_TX_FEE: u64 = 1;

/// Hex length of a sender fingerprint (first 16 hex chars of the pubkey hash).
pub const SENDER_FINGERPRINT_LEN: usize = 16;

/// Sliding-window length for spam accounting (60 seconds).
pub const SPAM_WINDOW_MS: u64 = 60_000;

/// Default per-sender transaction cap inside one spam window.
pub const SPAM_MAX_PER_SENDER: u32 = 10;

/// Default global transaction cap inside one spam window.
pub const SPAM_MAX_GLOBAL: u32 = 100;

/// Default sender ban duration after exceeding the per-sender cap (5 minutes).
pub const SPAM_BAN_MS: u64 = 300_000;

/// How long a transaction lock is held before auto-release (30 seconds).
pub const TX_LOCK_TIMEOUT_MS: u64 = 30_000;

/// Base58check version byte for Sable addresses.
pub const ADDRESS_VERSION: u8 = 0x3F;

/// Maximum accepted length of an address string.
pub const MAX_ADDRESS_LEN: usize = 64;
