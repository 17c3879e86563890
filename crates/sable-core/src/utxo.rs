//! In-memory ledger of unspent transaction outputs.
//!
//! A UTXO exists iff its producing output has been applied and no input has
//! consumed it. [`UtxoLedger::apply_block`] is all-or-nothing: if any input
//! references a missing UTXO the partially applied work is rolled back and
//! the ledger is left untouched.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::block::Block;
use crate::error::LedgerError;
use crate::transaction::Transaction;
use crate::types::Hash256;

/// Key of an unspent output: `(producing tx id, output index)`.
pub type OutPoint = (Hash256, u32);

/// An unspent transaction output.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Utxo {
    pub tx_id: Hash256,
    pub output_index: u32,
    pub address: Address,
    pub amount: u64,
    #[serde(default)]
    pub script: String,
}

/// Work applied while connecting a block, kept so a failed apply (or an
/// explicit rewind) can restore the previous state exactly.
#[derive(Clone, Debug, Default)]
struct BlockUndo {
    /// UTXOs consumed by the block, in consumption order.
    spent: Vec<Utxo>,
    /// Outpoints created by the block.
    created: Vec<OutPoint>,
}

/// Keyed store of unspent outputs with an address index for balance queries.
#[derive(Default, Debug)]
pub struct UtxoLedger {
    utxos: HashMap<OutPoint, Utxo>,
    /// Address → outpoints owned. BTreeMap keeps query iteration stable.
    by_address: BTreeMap<Address, Vec<OutPoint>>,
    /// Undo data per applied block hash, so a block can be rewound exactly.
    undo: HashMap<Hash256, BlockUndo>,
}

impl UtxoLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, utxo: Utxo) {
        let key = (utxo.tx_id, utxo.output_index);
        self.by_address.entry(utxo.address.clone()).or_default().push(key);
        self.utxos.insert(key, utxo);
    }

    fn remove(&mut self, key: &OutPoint) -> Option<Utxo> {
        let utxo = self.utxos.remove(key)?;
        if let Some(list) = self.by_address.get_mut(&utxo.address) {
            list.retain(|k| k != key);
            if list.is_empty() {
                self.by_address.remove(&utxo.address);
            }
        }
        Some(utxo)
    }

    fn apply_tx(&mut self, tx: &Transaction, undo: &mut BlockUndo) -> Result<(), LedgerError> {
        for input in tx.inputs() {
            let key = (input.prev_tx_id, input.output_index);
            let spent = self.remove(&key).ok_or_else(|| {
                LedgerError::MissingUtxo(format!("{}:{}", input.prev_tx_id, input.output_index))
            })?;
            undo.spent.push(spent);
        }
        let tx_id = tx.id().ok_or(LedgerError::UnidentifiedTransaction(0))?;
        for (index, output) in tx.outputs().iter().enumerate() {
            let utxo = Utxo {
                tx_id,
                output_index: index as u32,
                address: output.address.clone(),
                amount: output.amount,
                script: output.script.clone(),
            };
            undo.created.push((tx_id, index as u32));
            self.insert(utxo);
        }
        Ok(())
    }

    fn revert(&mut self, undo: BlockUndo) {
        for key in undo.created.iter().rev() {
            self.remove(key);
        }
        for utxo in undo.spent.into_iter().rev() {
            self.insert(utxo);
        }
    }

    /// Apply a block: consume every input's referenced UTXO, then create one
    /// UTXO per output.
    ///
    /// All-or-nothing: on a missing UTXO the ledger is restored to its
    /// pre-call state and the error returned.
    pub fn apply_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        let mut undo = BlockUndo::default();
        for tx in &block.transactions {
            if let Err(e) = self.apply_tx(tx, &mut undo) {
                self.revert(undo);
                return Err(e);
            }
        }
        self.undo.insert(block.hash, undo);
        Ok(())
    }

    /// Inverse of [`apply_block`](Self::apply_block): remove the block's
    /// outputs and restore its spent inputs from the recorded undo data.
    /// The chain admits no reorgs; this exists for state-roundtrip tests.
    pub fn rewind_block(&mut self, block: &Block) -> Result<(), LedgerError> {
        let undo = self
            .undo
            .remove(&block.hash)
            .ok_or_else(|| LedgerError::MissingUtxo(format!("undo for block {}", block.hash)))?;
        self.revert(undo);
        Ok(())
    }

    /// Confirmed balance of an address.
    pub fn balance(&self, address: &Address) -> u64 {
        self.by_address
            .get(address)
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.utxos.get(k))
                    .map(|u| u.amount)
                    .sum()
            })
            .unwrap_or(0)
    }

    /// All UTXOs owned by an address, ordered by (tx id, output index).
    pub fn utxos_of(&self, address: &Address) -> Vec<Utxo> {
        let mut list: Vec<Utxo> = self
            .by_address
            .get(address)
            .map(|keys| keys.iter().filter_map(|k| self.utxos.get(k)).cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| (a.tx_id, a.output_index).cmp(&(b.tx_id, b.output_index)));
        list
    }

    /// Look up a UTXO by outpoint.
    pub fn find(&self, tx_id: &Hash256, output_index: u32) -> Option<&Utxo> {
        self.utxos.get(&(*tx_id, output_index))
    }

    /// Whether an outpoint has been spent (or never existed).
    pub fn is_spent(&self, tx_id: &Hash256, output_index: u32) -> bool {
        !self.utxos.contains_key(&(*tx_id, output_index))
    }

    /// Number of unspent outputs.
    pub fn len(&self) -> usize {
        self.utxos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utxos.is_empty()
    }

    /// Reset and re-apply every block of `chain` in order.
    pub fn rebuild(&mut self, chain: &[Block]) -> Result<(), LedgerError> {
        self.utxos.clear();
        self.by_address.clear();
        self.undo.clear();
        for block in chain {
            self.apply_block(block)?;
        }
        Ok(())
    }
}
