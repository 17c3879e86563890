//! Shared test helpers for the integration suites.

use sable_consensus::checkpoint::CheckpointManager;
use sable_core::address::Address;
use sable_core::block::Block;
use sable_core::config::{ChainConfig, GenesisConfig};
use sable_core::crypto::KeyPair;
use sable_core::transaction::{now_ms, Transaction, TxInput, TxOutput};
use sable_core::types::{Algorithm, PrevHash, TxTag};
use sable_node_lib::engine::ChainEngine;

/// Wrap a fixture string as an address.
pub fn addr(s: &str) -> Address {
    Address::new(s).unwrap()
}

/// Config with a premine to `premine_address` and a genesis one block-time
/// in the past, so fresh successors satisfy the parent-interval rule.
pub fn config_with_premine(premine_address: &Address, premine_amount: u64) -> ChainConfig {
    let mut config = ChainConfig::default();
    config.blockchain.coinbase_reward = 50;
    config.blockchain.difficulty_minimum = 1;
    config.wallet.min_fee = 1;
    config.blockchain.genesis = Some(GenesisConfig {
        timestamp: now_ms() - 60_000,
        difficulty: 1000,
        premine_amount,
        premine_address: premine_address.clone(),
        nonce: 0,
        hash: None,
        algorithm: Algorithm::Sha256,
        coinbase_nonce: Some("genesis".into()),
        coinbase_atomic_sequence: None,
    });
    config
}

/// Engine with a funded keypair: the premine pays the key's derived address.
pub fn funded_engine(premine_amount: u64) -> (ChainEngine, KeyPair, Address) {
    let kp = KeyPair::generate();
    let owner = Address::from_public_key(&kp.public_key());
    let config = config_with_premine(&owner, premine_amount);
    let engine =
        ChainEngine::initialize(config, addr("addr_M"), CheckpointManager::new()).unwrap();
    (engine, kp, owner)
}

/// A signed, frozen transfer spending the first UTXO of `from`.
pub fn transfer(
    engine: &ChainEngine,
    owner: &KeyPair,
    from: &Address,
    to: &Address,
    amount: u64,
    fee: u64,
    nonce: &str,
) -> Transaction {
    let utxo = engine
        .utxos_of(from)
        .into_iter()
        .next()
        .expect("sender owns a utxo");
    let mut outputs = vec![TxOutput::new(to.clone(), amount)];
    let change = utxo.amount - amount - fee;
    if change > 0 {
        outputs.push(TxOutput::new(from.clone(), change));
    }
    let mut tx = Transaction::new(
        vec![TxInput::unsigned(utxo.tx_id, utxo.output_index, Vec::new())],
        outputs,
        fee,
        TxTag::Transaction,
        Some(now_ms()),
        Some(nonce.into()),
        None,
    )
    .unwrap();
    tx.sign(owner).unwrap();
    tx.compute_id().unwrap();
    tx
}

/// Mine the tip's successor containing `txs`, minting reward plus fees.
/// Uses sha256 at difficulty 1 so any hash meets the target.
pub fn next_block(engine: &ChainEngine, txs: Vec<Transaction>, timestamp: u64) -> Block {
    let reward =
        engine.config().blockchain.coinbase_reward + txs.iter().map(Transaction::fee).sum::<u64>();
    let mut coinbase = Transaction::coinbase(
        vec![TxOutput::new(addr("addr_M"), reward)],
        TxTag::Coinbase,
        Some(timestamp),
        Some(format!("cb{}", engine.height())),
        None,
    )
    .unwrap();
    coinbase.compute_id().unwrap();

    let mut all = vec![coinbase];
    all.extend(txs);
    Block::new(
        engine.height(),
        timestamp,
        all,
        PrevHash::Block(engine.latest_block().hash),
        0,
        1,
        Algorithm::Sha256,
        timestamp,
    )
    .unwrap()
}
