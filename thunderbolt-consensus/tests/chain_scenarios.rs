//! End-to-end scenarios for the chain engine: extension, reorgs,
//! orphans, bad proof of work, and mempool double spends.

use std::sync::Arc;

use secp256k1::{PublicKey, Secp256k1, SecretKey};

use thunderbolt_chain::{
    block::{merkle, Block, Header, Height},
    parameters::Network,
    transaction::{sighash, Transaction},
    transparent::{CoinbaseData, Input, LockScript, OutPoint, Output, Script},
    work::difficulty::CompactDifficulty,
};
use thunderbolt_consensus::{
    chain::{AcceptOutcome, ChainEngine, ChainEvent, ChainListener},
    error::{BlockError, TransactionError},
    mempool::{Mempool, MempoolInsertOutcome},
    subsidy,
};
use thunderbolt_state::{Config, FinalizedState};

struct TestChain {
    _dir: tempfile::TempDir,
    engine: ChainEngine,
    secret: SecretKey,
    payout: LockScript,
}

fn keypair() -> (SecretKey, PublicKey) {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[7u8; 32]).expect("constant key is valid");
    let public = PublicKey::from_secret_key(&secp, &secret);
    (secret, public)
}

fn new_chain() -> TestChain {
    thunderbolt_test::init();

    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        cache_dir: dir.path().to_path_buf(),
        segment_bytes: 4 * 1024 * 1024,
    };
    let state = FinalizedState::new(&config, Network::Testnet).unwrap();
    let engine = ChainEngine::new(state, Mempool::new(0), Network::Testnet).unwrap();

    let (secret, public) = keypair();
    TestChain {
        _dir: dir,
        engine,
        secret,
        payout: LockScript::single_sig(public.serialize().to_vec()),
    }
}

/// Mine a child block: assemble the coinbase, compute the merkle root,
/// and grind nonces against the (easy) testnet target.
fn mine_child(
    parent: &Header,
    parent_height: u64,
    txs: Vec<Arc<Transaction>>,
    payout: &LockScript,
    tag: u8,
) -> Arc<Block> {
    let height = Height(parent_height + 1);

    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height,
            data: CoinbaseData::new(vec![tag]).unwrap(),
        }],
        vec![Output {
            value: subsidy::block_subsidy(height).unwrap(),
            lock_script: payout.clone(),
        }],
        0,
    );

    let mut transactions = vec![Arc::new(coinbase)];
    transactions.extend(txs);

    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();
    let bits: CompactDifficulty = parent.bits;
    let target = bits.to_expanded().expect("testnet bits are valid");

    let mut nonce = 0u64;
    let header = loop {
        let header = Header::new(
            1,
            parent.hash(),
            merkle_root,
            height.0 * 600,
            bits,
            nonce,
        );
        if header.hash() <= target {
            break header;
        }
        nonce += 1;
    };

    Arc::new(Block {
        header,
        transactions,
    })
}

/// A transaction spending the (matured) coinbase of `block`, paying the
/// full value back to `payout`.
fn spend_coinbase(
    block: &Block,
    payout: &LockScript,
    secret: &SecretKey,
) -> Arc<Transaction> {
    let coinbase = &block.transactions[0];
    let outpoint = OutPoint {
        tx_id: coinbase.hash(),
        index: 0,
    };
    let lock = coinbase.outputs[0].lock_script.clone();

    let digest = sighash::signing_digest(&outpoint, &lock);
    let signature = sighash::sign(&digest, secret);

    Arc::new(Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint,
            unlock_script: Script(signature.to_vec()),
        }],
        vec![Output {
            value: coinbase.outputs[0].value,
            lock_script: payout.clone(),
        }],
        0,
    ))
}

/// Extend the engine's chain by `count` empty blocks, returning them.
fn extend_chain(chain: &mut TestChain, count: u64, tag: u8) -> Vec<Arc<Block>> {
    let mut blocks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let tip = chain.engine.tip().clone();
        let block = mine_child(&tip.header, tip.height.0, vec![], &chain.payout, tag);
        match chain.engine.accept(block.clone()).unwrap() {
            AcceptOutcome::Accepted => {}
            other => panic!("expected Accepted, got {:?}", other),
        }
        blocks.push(block);
    }
    blocks
}

#[test]
fn linear_extension_updates_tip_and_utxo_set() {
    let mut chain = new_chain();
    let genesis = chain.engine.tip().clone();

    let b1 = mine_child(&genesis.header, 0, vec![], &chain.payout, 0);
    let outcome = chain.engine.accept(b1.clone()).unwrap();
    assert!(matches!(outcome, AcceptOutcome::Accepted));

    let tip = chain.engine.tip();
    assert_eq!(tip.hash(), b1.hash());
    assert_eq!(tip.height, Height(1));

    // The coinbase output is now spendable state.
    let outpoint = OutPoint {
        tx_id: b1.transactions[0].hash(),
        index: 0,
    };
    let utxo = chain.engine.state().utxo(&outpoint).unwrap().unwrap();
    assert_eq!(utxo.output.value, subsidy::block_subsidy(Height(1)).unwrap());
    assert!(utxo.from_coinbase);

    // The mempool saw nothing.
    assert_eq!(chain.engine.mempool().count(), 0);

    // Accepting the same block again is a no-op.
    let again = chain.engine.accept(b1).unwrap();
    assert!(matches!(again, AcceptOutcome::AlreadyKnown));
}

#[test]
fn cumulative_work_accumulates_along_the_chain() {
    let mut chain = new_chain();
    let genesis = chain.engine.tip().clone();

    extend_chain(&mut chain, 2, 0);
    let tip = chain.engine.tip().clone();

    let parent = chain
        .engine
        .state()
        .metadata(&tip.header.parent_hash)
        .unwrap()
        .unwrap();

    assert!(tip.cum_work > parent.cum_work);
    assert!(parent.cum_work > genesis.cum_work);
}

#[test]
fn orphan_is_not_stored_until_its_parent_arrives() {
    let mut chain = new_chain();
    let genesis = chain.engine.tip().clone();

    let b1 = mine_child(&genesis.header, 0, vec![], &chain.payout, 0);
    let b2 = mine_child(&b1.header, 1, vec![], &chain.payout, 0);

    // Out of order: the child first.
    let outcome = chain.engine.accept(b2.clone()).unwrap();
    assert!(matches!(outcome, AcceptOutcome::Orphan));
    assert_eq!(chain.engine.tip().hash(), genesis.hash());
    assert!(!chain.engine.state().contains_block(&b2.hash()).unwrap());

    // The parent connects, then resubmitting the child extends.
    assert!(matches!(
        chain.engine.accept(b1.clone()).unwrap(),
        AcceptOutcome::Accepted
    ));
    assert!(matches!(
        chain.engine.accept(b2.clone()).unwrap(),
        AcceptOutcome::Accepted
    ));
    assert_eq!(chain.engine.tip().hash(), b2.hash());
}

#[test]
fn insufficient_proof_of_work_is_invalid_and_unpersisted() {
    let mut chain = new_chain();
    let genesis = chain.engine.tip().clone();

    // Grind in the wrong direction: find a header *above* the target.
    let target = genesis.header.bits.to_expanded().unwrap();
    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Height(1),
            data: CoinbaseData::new(vec![9]).unwrap(),
        }],
        vec![Output {
            value: subsidy::block_subsidy(Height(1)).unwrap(),
            lock_script: chain.payout.clone(),
        }],
        0,
    );
    let transactions = vec![Arc::new(coinbase)];
    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();

    let mut nonce = 0u64;
    let header = loop {
        let header = Header::new(
            1,
            genesis.hash(),
            merkle_root,
            600,
            genesis.header.bits,
            nonce,
        );
        if header.hash() > target {
            break header;
        }
        nonce += 1;
    };
    let bad = Arc::new(Block {
        header,
        transactions,
    });

    let outcome = chain.engine.accept(bad.clone()).unwrap();
    match outcome {
        AcceptOutcome::Invalid(BlockError::DifficultyFilter(hash)) => {
            assert_eq!(hash, bad.hash())
        }
        other => panic!("expected a difficulty filter failure, got {:?}", other),
    }

    assert_eq!(chain.engine.tip().hash(), genesis.hash());
    assert!(!chain.engine.state().contains_block(&bad.hash()).unwrap());
}

#[test]
fn mempool_rejects_double_spends_and_immature_coinbases() {
    let mut chain = new_chain();
    let blocks = extend_chain(&mut chain, 99, 0);
    let funding = blocks[0].clone(); // height 1 coinbase

    // Tip height is 99: the next block is 100, and 100 - 1 < maturity.
    let spend = spend_coinbase(&funding, &chain.payout, &chain.secret);
    match chain.engine.add_transaction(spend.clone()).unwrap() {
        MempoolInsertOutcome::Invalid(TransactionError::ImmatureCoinbaseSpend) => {}
        other => panic!("expected an immature coinbase rejection, got {:?}", other),
    }

    // One more block and the coinbase matures exactly.
    extend_chain(&mut chain, 1, 0);
    assert!(matches!(
        chain.engine.add_transaction(spend.clone()).unwrap(),
        MempoolInsertOutcome::Added
    ));
    assert!(chain.engine.mempool().contains(&spend.hash()));

    // A second spend of the same output is rejected; only the first stays.
    let rival = {
        // Same input, different output lock, so the id differs.
        let (_, public) = keypair();
        let mut lock = LockScript::single_sig(public.serialize().to_vec());
        lock.params.0.push(0);
        spend_with_lock(&funding, &lock, &chain.secret)
    };
    match chain.engine.add_transaction(rival.clone()).unwrap() {
        MempoolInsertOutcome::Invalid(TransactionError::MissingInput(_)) => {}
        other => panic!("expected a double spend rejection, got {:?}", other),
    }
    assert_eq!(chain.engine.mempool().count(), 1);
    assert!(!chain.engine.mempool().contains(&rival.hash()));
}

/// Like [`spend_coinbase`], but paying to an arbitrary lock.
fn spend_with_lock(block: &Block, payout: &LockScript, secret: &SecretKey) -> Arc<Transaction> {
    let coinbase = &block.transactions[0];
    let outpoint = OutPoint {
        tx_id: coinbase.hash(),
        index: 0,
    };
    let lock = coinbase.outputs[0].lock_script.clone();

    let digest = sighash::signing_digest(&outpoint, &lock);
    let signature = sighash::sign(&digest, secret);

    Arc::new(Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint,
            unlock_script: Script(signature.to_vec()),
        }],
        vec![Output {
            value: coinbase.outputs[0].value,
            lock_script: payout.clone(),
        }],
        0,
    ))
}

#[test]
fn reorganization_switches_to_the_heavier_branch() {
    let mut chain = new_chain();

    // A main chain long enough for a mature coinbase spend.
    let blocks = extend_chain(&mut chain, 101, 0);
    let funding = blocks[0].clone();
    let fork_base = blocks[99].clone(); // height 100

    // The old branch's last block confirms a spend of the mature coinbase.
    let spend = spend_coinbase(&funding, &chain.payout, &chain.secret);
    let tip = chain.engine.tip().clone();
    let spend_block = mine_child(
        &tip.header,
        tip.height.0,
        vec![spend.clone()],
        &chain.payout,
        0,
    );
    assert!(matches!(
        chain.engine.accept(spend_block.clone()).unwrap(),
        AcceptOutcome::Accepted
    ));
    let old_tip = chain.engine.tip().clone();
    assert_eq!(old_tip.height, Height(102));

    let spend_outpoint = OutPoint {
        tx_id: spend.hash(),
        index: 0,
    };
    assert!(chain.engine.state().utxo(&spend_outpoint).unwrap().is_some());

    // A side branch from height 100: two blocks only store...
    let s1 = mine_child(&fork_base.header, 100, vec![], &chain.payout, 1);
    let s2 = mine_child(&s1.header, 101, vec![], &chain.payout, 1);
    assert!(matches!(
        chain.engine.accept(s1.clone()).unwrap(),
        AcceptOutcome::SideChain
    ));
    assert!(matches!(
        chain.engine.accept(s2.clone()).unwrap(),
        AcceptOutcome::SideChain
    ));
    assert_eq!(chain.engine.tip().hash(), old_tip.hash());

    // ...but the third outweighs the old branch and triggers the switch.
    let s3 = mine_child(&s2.header, 102, vec![], &chain.payout, 1);
    assert!(matches!(
        chain.engine.accept(s3.clone()).unwrap(),
        AcceptOutcome::Accepted
    ));

    let new_tip = chain.engine.tip().clone();
    assert_eq!(new_tip.hash(), s3.hash());
    assert_eq!(new_tip.height, Height(103));
    assert!(new_tip.cum_work > old_tip.cum_work);

    // The old branch's effects are gone: the spend's output vanished
    // and the spent coinbase is a UTXO again.
    assert!(chain.engine.state().utxo(&spend_outpoint).unwrap().is_none());
    let funding_outpoint = OutPoint {
        tx_id: funding.transactions[0].hash(),
        index: 0,
    };
    assert!(chain
        .engine
        .state()
        .utxo(&funding_outpoint)
        .unwrap()
        .is_some());

    // The unconfirmed-again spend went back to the mempool.
    assert!(chain.engine.mempool().contains(&spend.hash()));

    // Old-branch coinbases are no longer UTXOs; new-branch ones are.
    let old_coinbase = OutPoint {
        tx_id: spend_block.transactions[0].hash(),
        index: 0,
    };
    assert!(chain.engine.state().utxo(&old_coinbase).unwrap().is_none());
    let new_coinbase = OutPoint {
        tx_id: s3.transactions[0].hash(),
        index: 0,
    };
    assert!(chain.engine.state().utxo(&new_coinbase).unwrap().is_some());

    // The main-chain index follows the new branch.
    assert_eq!(
        chain.engine.state().main_chain_hash(Height(101)).unwrap(),
        Some(s1.hash())
    );
}

/// A listener that journals events, standing in for the wallet.
struct RecordingListener {
    events: std::sync::mpsc::Sender<(Vec<u64>, usize, usize)>,
}

impl ChainListener for RecordingListener {
    fn chain_updated(&mut self, event: &ChainEvent) {
        let connected: Vec<u64> = event.connected.iter().map(|(_, h)| h.0).collect();
        let _ = self.events.send((
            connected,
            event.disconnected.len(),
            event.created_utxos.len(),
        ));
    }
}

#[test]
fn listeners_observe_commits_in_order() {
    let mut chain = new_chain();

    let (sender, receiver) = std::sync::mpsc::channel();
    chain
        .engine
        .add_listener(Box::new(RecordingListener { events: sender }));

    extend_chain(&mut chain, 3, 0);

    let heights: Vec<Vec<u64>> = receiver.try_iter().map(|(h, _, _)| h).collect();
    assert_eq!(heights, vec![vec![1], vec![2], vec![3]]);
}

#[test]
fn block_with_invalid_spend_is_rejected_at_connect() {
    let mut chain = new_chain();
    let blocks = extend_chain(&mut chain, 100, 0);

    // Forge a spend of a mature coinbase with a garbage signature.
    let tip = chain.engine.tip().clone();
    let coinbase = &blocks[0].transactions[0];
    let bogus = Arc::new(Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                tx_id: coinbase.hash(),
                index: 0,
            },
            unlock_script: Script(vec![0u8; 64]),
        }],
        vec![Output {
            value: coinbase.outputs[0].value,
            lock_script: chain.payout.clone(),
        }],
        0,
    ));

    let bad_block = mine_child(&tip.header, tip.height.0, vec![bogus], &chain.payout, 0);
    let outcome = chain.engine.accept(bad_block).unwrap();
    assert!(matches!(outcome, AcceptOutcome::Invalid(_)));
    assert_eq!(chain.engine.tip().hash(), tip.hash());
}
