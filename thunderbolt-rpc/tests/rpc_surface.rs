//! The RPC surface, exercised over a live engine actor and peer set.

use std::sync::Arc;

use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tokio::sync::{mpsc, watch};

use thunderbolt_chain::{parameters::Network, transparent::LockScript};
use thunderbolt_consensus::{
    chain::ChainEngine,
    mempool::Mempool,
    service::{self, ChainHandle},
};
use thunderbolt_network::PeerSetHandle;
use thunderbolt_rpc::{ErrorKind, NodeStatus, Rpc};
use thunderbolt_state::{Config as StateConfig, FinalizedState};

struct TestNode {
    _dir: tempfile::TempDir,
    rpc: Rpc,
    chain: ChainHandle,
    _peers: PeerSetHandle,
    _shutdown: watch::Sender<bool>,
}

fn payout_lock() -> LockScript {
    let secp = Secp256k1::new();
    let secret = SecretKey::from_slice(&[11u8; 32]).expect("constant key is valid");
    let public = PublicKey::from_secret_key(&secp, &secret);
    LockScript::single_sig(public.serialize().to_vec())
}

async fn start_node() -> TestNode {
    thunderbolt_test::init();

    let dir = tempfile::tempdir().unwrap();
    let state_config = StateConfig {
        cache_dir: dir.path().to_path_buf(),
        segment_bytes: 4 * 1024 * 1024,
    };
    let state = FinalizedState::new(&state_config, Network::Testnet).unwrap();
    let engine = ChainEngine::new(state, Mempool::new(0), Network::Testnet).unwrap();
    let (chain, _chain_task) = service::spawn(engine);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let net_config = thunderbolt_network::Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        network: Network::Testnet,
        ..Default::default()
    };
    let (peers, _peer_task) = thunderbolt_network::init(net_config, chain.clone(), shutdown_rx)
        .await
        .unwrap();

    let (stop_tx, _stop_rx) = mpsc::channel(1);
    let rpc = Rpc::new(
        chain.clone(),
        peers.clone(),
        Network::Testnet,
        Some(payout_lock()),
        stop_tx,
    );

    TestNode {
        _dir: dir,
        rpc,
        chain,
        _peers: peers,
        _shutdown: shutdown_tx,
    }
}

#[tokio::test]
async fn info_reports_genesis_and_offline() {
    let node = start_node().await;

    let info = node.rpc.get_info().await.unwrap();
    assert_eq!(info.height, 0);
    assert_eq!(info.network, "testnet");
    assert_eq!(info.status, NodeStatus::Offline);
    assert!(!info.is_initial_block_download);

    assert_eq!(node.rpc.get_block_count().await.unwrap(), 0);
    assert_eq!(node.rpc.get_transaction_pool_count().await.unwrap(), 0);

    // At the pow limit the reported difficulty is exactly 1.
    let difficulty = node.rpc.get_difficulty().await.unwrap();
    assert!((difficulty - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn get_work_then_submit_block_extends_the_chain() {
    let node = start_node().await;

    let template = node.rpc.get_work().await.unwrap();
    assert_eq!(template.height.0, 1);

    // Grind the (easy) testnet target.
    let target = template.bits.to_expanded().unwrap();
    let mut nonce = 0u64;
    let block = loop {
        let candidate = template.build_block(nonce);
        if candidate.hash() <= target {
            break Arc::new(candidate);
        }
        nonce += 1;
    };

    assert!(node.rpc.submit_block(block.clone()).await.unwrap());

    assert_eq!(node.rpc.get_block_count().await.unwrap(), 1);
    assert_eq!(node.rpc.get_best_block_hash().await.unwrap(), block.hash());

    // The block and its coinbase are reachable through the surface.
    let fetched = node.rpc.get_block(block.hash()).await.unwrap();
    assert_eq!(fetched, block);

    let coinbase_id = block.transactions[0].hash();
    let location = node.rpc.get_transaction_metadata(coinbase_id).await.unwrap();
    assert_eq!(location.height.0, 1);
    assert_eq!(location.index, 0);

    let utxo = node.rpc.get_unspent_output(coinbase_id, 0).await.unwrap();
    assert!(utxo.from_coinbase);

    // The coinbase pays the configured lock; its address has a balance.
    let address = utxo.output.address_hash().unwrap();
    let balance = node.rpc.get_address_balance(address).await.unwrap();
    assert_eq!(balance, utxo.output.value.atoms() as u64);

    // The chain handle sees the same tip the RPC reports.
    let tip = node.chain.tip().await.unwrap();
    assert_eq!(tip.hash(), block.hash());
}

#[tokio::test]
async fn unknown_lookups_fail_with_validation_kind() {
    let node = start_node().await;

    let missing = node
        .rpc
        .get_block(thunderbolt_chain::block::Hash([9u8; 32]))
        .await
        .unwrap_err();
    assert_eq!(missing.kind, ErrorKind::Validation);

    let missing = node
        .rpc
        .get_peer_info("203.0.113.9:8533".parse().unwrap())
        .await
        .unwrap_err();
    assert_eq!(missing.kind, ErrorKind::Validation);
}
