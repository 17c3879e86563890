//! Transaction records: inputs, outputs, replay-protection fields, canonical
//! ID derivation, and signing.
//!
//! A transaction is mutable while being assembled and signed; once
//! [`Transaction::compute_id`] derives the ID the record freezes and every
//! later mutation fails with [`TransactionError::Immutable`]. The ID is the
//! double-SHA-256 of the canonical JSON form (sorted keys, `id` omitted), so
//! it is stable across runs, platforms, and source field orderings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Address;
use crate::canonical;
use crate::constants::TX_EXPIRY_MS;
use crate::crypto::{self, double_hash, KeyPair, PublicKey};
use crate::error::TransactionError;
use crate::types::{Hash256, TxTag};

/// Current timestamp in Unix milliseconds.
pub fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

/// Generate an opaque unique nonce string (16 random bytes, hex).
pub fn generate_nonce() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Hex-string serde for raw byte fields (signatures, public keys).
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// A transaction input spending a previous output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxInput {
    /// ID of the transaction containing the referenced output.
    #[serde(rename = "txId")]
    pub prev_tx_id: Hash256,
    /// Index of the output within that transaction.
    pub output_index: u32,
    /// Ed25519 signature over the owning transaction's signing bytes.
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
    /// Declared Ed25519 public key of the output owner.
    #[serde(with = "hex_bytes")]
    pub public_key: Vec<u8>,
}

impl TxInput {
    /// An unsigned input referencing `(prev_tx_id, output_index)`.
    pub fn unsigned(prev_tx_id: Hash256, output_index: u32, public_key: Vec<u8>) -> Self {
        Self {
            prev_tx_id,
            output_index,
            signature: Vec::new(),
            public_key,
        }
    }
}

/// A transaction output crediting an address.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TxOutput {
    /// Recipient address (canonical string form).
    pub address: Address,
    /// Amount in motes.
    pub amount: u64,
    /// Opaque locking script.
    #[serde(rename = "scriptPubKey", default)]
    pub script: String,
}

impl TxOutput {
    pub fn new(address: Address, amount: u64) -> Self {
        Self {
            address,
            amount,
            script: String::new(),
        }
    }
}

/// A value transfer with replay-protection fields.
///
/// Field mutability is gated on [`id`](Self::id): `None` means the record is
/// still under construction, `Some` means frozen.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Derived transaction ID. Present once frozen.
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Hash256>,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    /// Declared fee in motes.
    fee: u64,
    /// Creation time in Unix milliseconds.
    timestamp: u64,
    is_coinbase: bool,
    tag: TxTag,
    /// Opaque unique nonce. Required for non-coinbase transactions.
    #[serde(skip_serializing_if = "Option::is_none")]
    nonce: Option<String>,
    /// Expiry instant in Unix milliseconds. Required for non-coinbase.
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<u64>,
    #[serde(default)]
    sequence: u32,
    /// Opaque uniqueness token for atomic submission flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    atomic_sequence: Option<String>,
}

impl Transaction {
    /// Build a non-coinbase transaction.
    ///
    /// `timestamp` defaults to the current wall clock, `nonce` to a random
    /// value; `expires_at` is always `timestamp + 24h`. Fails with
    /// `InvalidFormat` on empty inputs or outputs, or a coinbase-reserved tag.
    pub fn new(
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        fee: u64,
        tag: TxTag,
        timestamp: Option<u64>,
        nonce: Option<String>,
        atomic_sequence: Option<String>,
    ) -> Result<Self, TransactionError> {
        if tag.is_coinbase_tag() {
            return Err(TransactionError::InvalidFormat(format!(
                "tag {tag} is reserved for coinbase records"
            )));
        }
        if inputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty inputs".into()));
        }
        if outputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty outputs".into()));
        }
        let timestamp = timestamp.unwrap_or_else(now_ms);
        Ok(Self {
            id: None,
            inputs,
            outputs,
            fee,
            timestamp,
            is_coinbase: false,
            tag,
            nonce: Some(nonce.unwrap_or_else(generate_nonce)),
            expires_at: Some(timestamp + TX_EXPIRY_MS),
            sequence: 0,
            atomic_sequence,
        })
    }

    /// Build a coinbase (or genesis premine) transaction.
    ///
    /// Inputs are omitted entirely; the tag must be `COINBASE` or `PREMINE`.
    pub fn coinbase(
        outputs: Vec<TxOutput>,
        tag: TxTag,
        timestamp: Option<u64>,
        nonce: Option<String>,
        atomic_sequence: Option<String>,
    ) -> Result<Self, TransactionError> {
        if !tag.is_coinbase_tag() {
            return Err(TransactionError::InvalidFormat(format!(
                "tag {tag} is not a coinbase tag"
            )));
        }
        if outputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty outputs".into()));
        }
        Ok(Self {
            id: None,
            inputs: Vec::new(),
            outputs,
            fee: 0,
            timestamp: timestamp.unwrap_or_else(now_ms),
            is_coinbase: true,
            tag,
            nonce,
            expires_at: None,
            sequence: 0,
            atomic_sequence,
        })
    }

    // --- Accessors ---

    /// The derived ID, or `None` while the record is under construction.
    pub fn id(&self) -> Option<Hash256> {
        self.id
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn tag(&self) -> TxTag {
        self.tag
    }

    pub fn is_coinbase(&self) -> bool {
        self.is_coinbase
    }

    pub fn nonce(&self) -> Option<&str> {
        self.nonce.as_deref()
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn atomic_sequence(&self) -> Option<&str> {
        self.atomic_sequence.as_deref()
    }

    /// Whether the record is frozen (ID derived).
    pub fn is_frozen(&self) -> bool {
        self.id.is_some()
    }

    /// Checked sum of all output amounts.
    pub fn total_output(&self) -> Result<u64, TransactionError> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, out| acc.checked_add(out.amount))
            .ok_or(TransactionError::ValueOverflow)
    }

    /// Canonical serialized size in bytes (mempool memory accounting).
    pub fn serialized_size(&self) -> usize {
        canonical::to_canonical_bytes(self).map_or(0, |b| b.len())
    }

    /// Coarse sender identity from the first input's public key.
    pub fn sender_fingerprint(&self) -> Option<String> {
        self.inputs
            .first()
            .filter(|i| !i.public_key.is_empty())
            .map(|i| crypto::sender_fingerprint(&i.public_key))
    }

    // --- Mutation (construction phase only) ---

    fn ensure_mutable(&self) -> Result<(), TransactionError> {
        if self.is_frozen() {
            return Err(TransactionError::Immutable);
        }
        Ok(())
    }

    pub fn set_fee(&mut self, fee: u64) -> Result<(), TransactionError> {
        self.ensure_mutable()?;
        self.fee = fee;
        Ok(())
    }

    pub fn set_outputs(&mut self, outputs: Vec<TxOutput>) -> Result<(), TransactionError> {
        self.ensure_mutable()?;
        if outputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty outputs".into()));
        }
        self.outputs = outputs;
        Ok(())
    }

    pub fn set_inputs(&mut self, inputs: Vec<TxInput>) -> Result<(), TransactionError> {
        self.ensure_mutable()?;
        if !self.is_coinbase && inputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty inputs".into()));
        }
        self.inputs = inputs;
        Ok(())
    }

    pub fn set_sequence(&mut self, sequence: u32) -> Result<(), TransactionError> {
        self.ensure_mutable()?;
        self.sequence = sequence;
        Ok(())
    }

    // --- Identity and signing ---

    /// Canonical bytes for ID derivation: the full record minus `id`.
    fn id_payload(&self) -> Result<Vec<u8>, TransactionError> {
        canonical::to_canonical_bytes_with(self, |v| {
            if let Some(obj) = v.as_object_mut() {
                obj.remove("id");
            }
        })
    }

    /// Canonical bytes for signing: the record minus `id` and every input's
    /// `signature` field, so inputs can be signed without circularity.
    fn signing_payload(&self) -> Result<Vec<u8>, TransactionError> {
        canonical::to_canonical_bytes_with(self, |v| {
            let Some(obj) = v.as_object_mut() else { return };
            obj.remove("id");
            if let Some(Value::Array(inputs)) = obj.get_mut("inputs") {
                for input in inputs {
                    if let Some(i) = input.as_object_mut() {
                        i.remove("signature");
                    }
                }
            }
        })
    }

    /// Derive the ID and freeze the record. Idempotent once frozen.
    pub fn compute_id(&mut self) -> Result<Hash256, TransactionError> {
        if let Some(id) = self.id {
            return Ok(id);
        }
        let id = double_hash(&self.id_payload()?);
        self.id = Some(id);
        Ok(id)
    }

    /// Sign every input with `keypair`.
    ///
    /// Writes the signer's public key into each input, then signs the
    /// canonical signing bytes (which exclude signatures) and stores the
    /// same signature on every input. Must precede [`compute_id`](Self::compute_id).
    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), TransactionError> {
        self.ensure_mutable()?;
        if self.is_coinbase {
            return Err(TransactionError::InvalidFormat(
                "coinbase transactions are not signed".into(),
            ));
        }
        let pubkey = keypair.public_key().to_bytes().to_vec();
        for input in &mut self.inputs {
            input.public_key = pubkey.clone();
        }
        let payload = self.signing_payload()?;
        let signature = keypair.sign(&payload).to_vec();
        for input in &mut self.inputs {
            input.signature = signature.clone();
        }
        Ok(())
    }

    /// Verify every input signature against its declared public key.
    ///
    /// Non-coinbase only; a coinbase record trivially verifies.
    pub fn verify(&self) -> bool {
        if self.is_coinbase {
            return true;
        }
        let Ok(payload) = self.signing_payload() else {
            return false;
        };
        self.inputs.iter().all(|input| {
            PublicKey::from_bytes(&input.public_key)
                .and_then(|pk| pk.verify(&payload, &input.signature))
                .is_ok()
        })
    }

    /// Whether the transaction has expired at instant `now` (ms).
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }

    /// Sorted, deduplicated input public keys (replay identity).
    fn sorted_input_keys(&self) -> Vec<Vec<u8>> {
        let mut keys: Vec<Vec<u8>> = self.inputs.iter().map(|i| i.public_key.clone()).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Whether this transaction replays any of `others`: same ID, or same
    /// nonce with an identical sorted set of input public keys.
    pub fn is_replay_of<'a>(&self, others: impl IntoIterator<Item = &'a Transaction>) -> bool {
        let own_keys = self.sorted_input_keys();
        others.into_iter().any(|other| {
            if let (Some(a), Some(b)) = (self.id, other.id) {
                if a == b {
                    return true;
                }
            }
            match (&self.nonce, &other.nonce) {
                (Some(a), Some(b)) if a == b => other.sorted_input_keys() == own_keys,
                _ => false,
            }
        })
    }

    /// Full standalone validity check.
    ///
    /// Coinbase: outputs must sum to a positive amount. Non-coinbase: nonce
    /// and expiry present and unexpired, inputs non-empty, all signatures
    /// verify, and the fee meets the configured minimum.
    pub fn validate(&self, min_fee: u64, now: u64) -> Result<(), TransactionError> {
        if self.outputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty outputs".into()));
        }
        if self.is_coinbase {
            if !self.inputs.is_empty() || !self.tag.is_coinbase_tag() {
                return Err(TransactionError::InvalidFormat(
                    "malformed coinbase record".into(),
                ));
            }
            if self.total_output()? == 0 {
                return Err(TransactionError::InvalidFormat(
                    "coinbase mints nothing".into(),
                ));
            }
            return Ok(());
        }

        if self.tag.is_coinbase_tag() {
            return Err(TransactionError::InvalidFormat(
                "coinbase tag on regular transaction".into(),
            ));
        }
        let (Some(_), Some(expires_at)) = (&self.nonce, self.expires_at) else {
            return Err(TransactionError::MissingReplayProtection);
        };
        if now > expires_at {
            return Err(TransactionError::Expired { expires_at, now });
        }
        if self.inputs.is_empty() {
            return Err(TransactionError::InvalidFormat("empty inputs".into()));
        }
        self.total_output()?;
        if !self.verify() {
            return Err(TransactionError::SignatureInvalid { index: 0 });
        }
        if self.fee < min_fee {
            return Err(TransactionError::FeeBelowMinimum {
                fee: self.fee,
                minimum: min_fee,
            });
        }
        Ok(())
    }

    /// Boolean form of [`validate`](Self::validate).
    pub fn is_valid(&self, min_fee: u64, now: u64) -> bool {
        self.validate(min_fee, now).is_ok()
    }
}
