//! A real TCP session against the peer manager: handshake, ping/pong,
//! and inventory fetching.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_util::codec::Framed;

use thunderbolt_chain::{block, parameters::Network};
use thunderbolt_consensus::{chain::ChainEngine, mempool::Mempool, service};
use thunderbolt_network::protocol::external::types::{Nonce, PeerServices};
use thunderbolt_network::protocol::external::{Codec, InventoryHash, Message, Version};
use thunderbolt_network::{constants, PeerSetHandle};
use thunderbolt_state::{Config as StateConfig, FinalizedState};

struct TestNode {
    _dir: tempfile::TempDir,
    peers: PeerSetHandle,
    _shutdown: watch::Sender<bool>,
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
    let config = thunderbolt_network::Config {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        network: Network::Testnet,
        ..Default::default()
    };
    let (peers, _task) = thunderbolt_network::init(config, chain, shutdown_rx)
        .await
        .unwrap();

    TestNode {
        _dir: dir,
        peers,
        _shutdown: shutdown_tx,
    }
}

fn test_version(best: u64) -> Message {
    Message::Version(Version::new(
        constants::CURRENT_VERSION,
        "127.0.0.1:1".parse::<SocketAddr>().unwrap(),
        PeerServices::NODE_NETWORK,
        PeerServices::NODE_NETWORK,
        "127.0.0.1:2".parse::<SocketAddr>().unwrap(),
        Nonce::default(),
        "/integration-test:0.1.0/".to_owned(),
        block::Height(best),
        true,
    ))
}

/// Read messages until `want` returns true for one, failing on timeout.
async fn read_until<F>(
    framed: &mut Framed<TcpStream, Codec>,
    mut want: F,
) -> Message
where
    F: FnMut(&Message) -> bool,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let message = framed
                .next()
                .await
                .expect("connection stays open")
                .expect("messages decode");
            if want(&message) {
                return message;
            }
        }
    })
    .await
    .expect("expected message before timeout")
}

#[tokio::test]
async fn handshake_ping_and_inventory_fetch() {
    let node = start_node().await;

    let stream = TcpStream::connect(node.peers.local_addr()).await.unwrap();
    let mut framed = Framed::new(
        stream,
        Codec::builder().for_network(Network::Testnet).finish(),
    );

    // We open; the node answers with its own version, then a verack.
    framed.send(test_version(0)).await.unwrap();
    read_until(&mut framed, |m| matches!(m, Message::Version(_))).await;
    read_until(&mut framed, |m| matches!(m, Message::Verack)).await;
    framed.send(Message::Verack).await.unwrap();

    // The post-handshake greeting solicits our addresses.
    read_until(&mut framed, |m| matches!(m, Message::GetAddr)).await;

    // Ping is echoed with the same nonce.
    framed.send(Message::Ping(Nonce(4242))).await.unwrap();
    let pong = read_until(&mut framed, |m| matches!(m, Message::Pong(_))).await;
    assert_eq!(pong, Message::Pong(Nonce(4242)));

    // Advertising an unknown block triggers a getdata for it.
    let advertised = block::Hash([0xabu8; 32]);
    framed
        .send(Message::Inv(vec![InventoryHash::Block(advertised)]))
        .await
        .unwrap();
    let getdata = read_until(&mut framed, |m| matches!(m, Message::GetData(_))).await;
    assert_eq!(
        getdata,
        Message::GetData(vec![InventoryHash::Block(advertised)])
    );

    // One peer is connected and visible through the handle.
    let infos = node.peers.list_peers().await;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].direction, "inbound");
}

#[tokio::test]
async fn getblocks_returns_inventory_for_known_chain() {
    let node = start_node().await;

    let stream = TcpStream::connect(node.peers.local_addr()).await.unwrap();
    let mut framed = Framed::new(
        stream,
        Codec::builder().for_network(Network::Testnet).finish(),
    );

    framed.send(test_version(0)).await.unwrap();
    read_until(&mut framed, |m| matches!(m, Message::Verack)).await;
    framed.send(Message::Verack).await.unwrap();

    // Asking for the mempool of an idle node yields nothing, but the
    // request must not kill the session.
    framed.send(Message::Mempool).await.unwrap();
    framed.send(Message::Ping(Nonce(1))).await.unwrap();
    let pong = read_until(&mut framed, |m| matches!(m, Message::Pong(_))).await;
    assert_eq!(pong, Message::Pong(Nonce(1)));
}
