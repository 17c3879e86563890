//! Core protocol types shared across the workspace.
//!
//! All hashes render as 64-char lowercase hex in external JSON. The genesis
//! block's parent is the literal sentinel `"0"`, modeled as
//! [`PrevHash::Genesis`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 32-byte hash value.
///
/// Used for transaction IDs, block hashes, and merkle roots. External JSON
/// form is 64 lowercase hex characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash (32 zero bytes). Used as the empty merkle root.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from a 64-char hex string.
    pub fn from_hex(s: &str) -> Result<Self, String> {
        if s.len() != 64 {
            return Err(format!("expected 64 hex chars, got {}", s.len()));
        }
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        let arr: [u8; 32] = bytes.try_into().expect("decoded 64 hex chars are 32 bytes");
        Ok(Self(arr))
    }

    /// Render as 64-char lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for Hash256 {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Reference to a block's parent.
///
/// Genesis carries the sentinel `"0"` in all external formats; every other
/// block links to its parent's header hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PrevHash {
    /// The genesis sentinel, serialized as the literal string `"0"`.
    Genesis,
    /// A parent block hash.
    Block(Hash256),
}

impl PrevHash {
    pub fn is_genesis(&self) -> bool {
        matches!(self, PrevHash::Genesis)
    }

    /// The parent hash, or `None` for genesis.
    pub fn hash(&self) -> Option<Hash256> {
        match self {
            PrevHash::Genesis => None,
            PrevHash::Block(h) => Some(*h),
        }
    }
}

impl fmt::Display for PrevHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrevHash::Genesis => f.write_str("0"),
            PrevHash::Block(h) => write!(f, "{h}"),
        }
    }
}

impl FromStr for PrevHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "0" {
            return Ok(PrevHash::Genesis);
        }
        Hash256::from_hex(s).map(PrevHash::Block)
    }
}

impl Serialize for PrevHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PrevHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Hashing algorithm claimed by a block header.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Sha256,
    #[default]
    Kawpow,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Sha256 => f.write_str("sha256"),
            Algorithm::Kawpow => f.write_str("kawpow"),
        }
    }
}

/// Transaction category tag.
///
/// User-submitted transactions must carry [`TxTag::Transaction`]; the other
/// tags are reserved for protocol-generated records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TxTag {
    Coinbase,
    Premine,
    #[default]
    Transaction,
    Staking,
    Governance,
}

impl TxTag {
    /// Whether this tag is allowed on a coinbase record.
    pub fn is_coinbase_tag(&self) -> bool {
        matches!(self, TxTag::Coinbase | TxTag::Premine)
    }
}

impl fmt::Display for TxTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxTag::Coinbase => "COINBASE",
            TxTag::Premine => "PREMINE",
            TxTag::Transaction => "TRANSACTION",
            TxTag::Staking => "STAKING",
            TxTag::Governance => "GOVERNANCE",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Hash256 ---

    #[test]
    fn hash256_zero_is_zero() {
        assert!(Hash256::ZERO.is_zero());
        assert_eq!(Hash256::ZERO, Hash256::default());
    }

    #[test]
    fn hash256_hex_roundtrip() {
        let h = Hash256([0xAB; 32]);
        let s = h.to_hex();
        assert_eq!(s.len(), 64);
        assert_eq!(Hash256::from_hex(&s).unwrap(), h);
    }

    #[test]
    fn hash256_rejects_short_hex() {
        assert!(Hash256::from_hex("abcd").is_err());
    }

    #[test]
    fn hash256_rejects_non_hex() {
        assert!(Hash256::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn hash256_json_is_hex_string() {
        let h = Hash256([0x01; 32]);
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, format!("\"{}\"", "01".repeat(32)));
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    // --- PrevHash ---

    #[test]
    fn prev_hash_genesis_sentinel() {
        assert_eq!(PrevHash::Genesis.to_string(), "0");
        assert_eq!("0".parse::<PrevHash>().unwrap(), PrevHash::Genesis);
        assert!(PrevHash::Genesis.is_genesis());
        assert_eq!(PrevHash::Genesis.hash(), None);
    }

    #[test]
    fn prev_hash_block_roundtrip() {
        let h = Hash256([0x42; 32]);
        let p = PrevHash::Block(h);
        assert_eq!(p.to_string().parse::<PrevHash>().unwrap(), p);
        assert_eq!(p.hash(), Some(h));
    }

    #[test]
    fn prev_hash_json_genesis() {
        let json = serde_json::to_string(&PrevHash::Genesis).unwrap();
        assert_eq!(json, "\"0\"");
        let back: PrevHash = serde_json::from_str("\"0\"").unwrap();
        assert_eq!(back, PrevHash::Genesis);
    }

    #[test]
    fn prev_hash_rejects_garbage() {
        assert!("not-a-hash".parse::<PrevHash>().is_err());
    }

    // --- Algorithm / TxTag ---

    #[test]
    fn algorithm_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Algorithm::Kawpow).unwrap(), "\"kawpow\"");
        assert_eq!(serde_json::to_string(&Algorithm::Sha256).unwrap(), "\"sha256\"");
        let a: Algorithm = serde_json::from_str("\"sha256\"").unwrap();
        assert_eq!(a, Algorithm::Sha256);
    }

    #[test]
    fn tx_tag_serde_uppercase() {
        assert_eq!(serde_json::to_string(&TxTag::Premine).unwrap(), "\"PREMINE\"");
        let t: TxTag = serde_json::from_str("\"GOVERNANCE\"").unwrap();
        assert_eq!(t, TxTag::Governance);
    }

    #[test]
    fn coinbase_tags() {
        assert!(TxTag::Coinbase.is_coinbase_tag());
        assert!(TxTag::Premine.is_coinbase_tag());
        assert!(!TxTag::Transaction.is_coinbase_tag());
        assert!(!TxTag::Staking.is_coinbase_tag());
    }
}
