//! The internal API surface consumed by the JSON-RPC transport.
//!
//! This crate is deliberately thin: every method resolves through the
//! chain service actor or the peer manager handle, translates the
//! result into transport-friendly shapes, and tags failures with the
//! error taxonomy. The HTTP/JSON layer itself lives outside the core.

#[macro_use]
extern crate serde;

mod error;

pub use error::{ErrorKind, RpcError};

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::info;

use thunderbolt_chain::{
    block::{self, Block, Header},
    parameters::Network,
    transaction::{self, Transaction},
    transparent::{AddressHash, LockScript, OutPoint},
    work::difficulty::ExpandedDifficulty,
};
use thunderbolt_consensus::{
    chain::AcceptOutcome,
    mempool::MempoolInsertOutcome,
    miner::WorkTemplate,
    service::{ChainHandle, Request, Response},
};
use thunderbolt_network::{PeerInfo, PeerSetHandle};
use thunderbolt_state::{TransactionLocation, Utxo};

/// The node's coarse operating state.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum NodeStatus {
    /// No peers.
    Offline,
    /// Initial block download is running.
    Syncing,
    /// Connected and caught up.
    Ready,
}

/// The `getInfo` response.
#[derive(Clone, Debug, Serialize)]
pub struct NodeInfo {
    pub version: String,
    pub network: String,
    pub height: u64,
    pub best_block_hash: String,
    pub peer_count: usize,
    pub status: NodeStatus,
    pub is_initial_block_download: bool,
    pub uptime_seconds: u64,
}

/// The method surface the JSON-RPC transport calls into.
pub struct Rpc {
    chain: ChainHandle,
    peers: PeerSetHandle,
    network: Network,
    started_at: Instant,
    /// Mined rewards pay to this lock; `getWork` fails without one.
    miner_payout: Option<LockScript>,
    /// `stop()` nudges the daemon's shutdown path through here.
    stop: mpsc::Sender<()>,
}

impl Rpc {
    pub fn new(
        chain: ChainHandle,
        peers: PeerSetHandle,
        network: Network,
        miner_payout: Option<LockScript>,
        stop: mpsc::Sender<()>,
    ) -> Rpc {
        Rpc {
            chain,
            peers,
            network,
            started_at: Instant::now(),
            miner_payout,
            stop,
        }
    }

    // ==== node ====

    pub async fn get_info(&self) -> Result<NodeInfo, RpcError> {
        let tip = self.chain.tip().await?;
        let peer_count = self.peers.list_peers().await.len();
        let is_ibd = self.peers.is_initial_block_download();

        let status = if peer_count == 0 {
            NodeStatus::Offline
        } else if is_ibd {
            NodeStatus::Syncing
        } else {
            NodeStatus::Ready
        };

        Ok(NodeInfo {
            version: env!("CARGO_PKG_VERSION").to_owned(),
            network: self.network.to_string(),
            height: tip.height.0,
            best_block_hash: tip.hash().to_string(),
            peer_count,
            status,
            is_initial_block_download: is_ibd,
            uptime_seconds: self.started_at.elapsed().as_secs(),
        })
    }

    /// The tip difficulty as a multiple of the network's easiest target.
    pub async fn get_difficulty(&self) -> Result<f64, RpcError> {
        let tip = self.chain.tip().await?;

        let target = tip
            .header
            .bits
            .to_expanded()
            .ok_or_else(|| RpcError::consensus("tip carries an invalid difficulty encoding"))?;
        let limit = self
            .network
            .pow_limit()
            .to_expanded()
            .expect("the pow limit is a valid difficulty encoding");

        Ok(difficulty_ratio(limit, target))
    }

    pub fn is_initial_block_download(&self) -> bool {
        self.peers.is_initial_block_download()
    }

    pub fn get_uptime(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Ask the daemon to shut down gracefully.
    pub async fn stop(&self) -> Result<(), RpcError> {
        info!("shutdown requested over rpc");
        self.stop
            .send(())
            .await
            .map_err(|_| RpcError::resource("the daemon is already shutting down"))
    }

    // ==== chain ====

    pub async fn get_block_count(&self) -> Result<u64, RpcError> {
        Ok(self.chain.tip().await?.height.0)
    }

    pub async fn get_best_block_hash(&self) -> Result<block::Hash, RpcError> {
        Ok(self.chain.tip().await?.hash())
    }

    pub async fn get_block(&self, hash: block::Hash) -> Result<Arc<Block>, RpcError> {
        self.chain
            .block(hash)
            .await?
            .ok_or_else(|| RpcError::validation("unknown block hash"))
    }

    pub async fn get_block_header(&self, hash: block::Hash) -> Result<Header, RpcError> {
        match self.chain.call(Request::Metadata(hash)).await? {
            Response::Metadata(Some(meta)) => Ok(meta.header),
            Response::Metadata(None) => Err(RpcError::validation("unknown block hash")),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn get_transaction(
        &self,
        hash: transaction::Hash,
    ) -> Result<Arc<Transaction>, RpcError> {
        self.chain
            .transaction(hash)
            .await?
            .ok_or_else(|| RpcError::validation("unknown transaction id"))
    }

    pub async fn get_transaction_metadata(
        &self,
        hash: transaction::Hash,
    ) -> Result<TransactionLocation, RpcError> {
        match self.chain.call(Request::TransactionLocation(hash)).await? {
            Response::TransactionLocation(Some(location)) => Ok(location),
            Response::TransactionLocation(None) => {
                Err(RpcError::validation("transaction is not in a block"))
            }
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn get_unspent_output(
        &self,
        tx_id: transaction::Hash,
        index: u32,
    ) -> Result<Utxo, RpcError> {
        let outpoint = OutPoint { tx_id, index };
        match self.chain.call(Request::Utxo(outpoint)).await? {
            Response::Utxo(Some(utxo)) => Ok(utxo),
            Response::Utxo(None) => Err(RpcError::validation("no such unspent output")),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    /// Every unspent output paying an address hash (the wallet seam).
    pub async fn get_address_utxos(
        &self,
        address: AddressHash,
    ) -> Result<Vec<Utxo>, RpcError> {
        match self.chain.call(Request::UtxosByAddress(address)).await? {
            Response::Utxos(utxos) => Ok(utxos),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    /// The confirmed balance of an address hash, in atomic units.
    pub async fn get_address_balance(&self, address: AddressHash) -> Result<u64, RpcError> {
        let utxos = self.get_address_utxos(address).await?;
        Ok(utxos
            .iter()
            .map(|utxo| utxo.output.value.atoms() as u64)
            .sum())
    }

    // ==== mempool ====

    pub async fn get_transaction_pool_count(&self) -> Result<usize, RpcError> {
        match self.chain.call(Request::MempoolStats).await? {
            Response::MempoolStats { count, .. } => Ok(count),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn get_transaction_pool_size(&self) -> Result<usize, RpcError> {
        match self.chain.call(Request::MempoolStats).await? {
            Response::MempoolStats { size_bytes, .. } => Ok(size_bytes),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn get_mempool_last_update_time(&self) -> Result<u64, RpcError> {
        match self.chain.call(Request::MempoolStats).await? {
            Response::MempoolStats { last_updated, .. } => Ok(last_updated),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    /// Submit a transaction (the wallet transfer seam): validate into
    /// the mempool, then announce it.
    pub async fn submit_transaction(&self, tx: Arc<Transaction>) -> Result<(), RpcError> {
        let hash = tx.hash();
        match self.chain.add_transaction(tx).await? {
            MempoolInsertOutcome::Added => {
                self.peers.announce_transaction(hash).await;
                Ok(())
            }
            MempoolInsertOutcome::AlreadyKnown => Ok(()),
            MempoolInsertOutcome::Invalid(error) => Err(RpcError::validation(&error.to_string())),
        }
    }

    // ==== mining ====

    /// Build a work template on the current tip (`getWork`).
    pub async fn get_work(&self) -> Result<WorkTemplate, RpcError> {
        let payout = self
            .miner_payout
            .clone()
            .ok_or_else(|| RpcError::resource("no miner payout lock is configured"))?;

        match self.chain.call(Request::WorkTemplate { payout }).await? {
            Response::WorkTemplate(template) => Ok(template),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    /// Submit a mined block. Succeeds iff the block connected or was
    /// stored on a side chain.
    pub async fn submit_block(&self, block: Arc<Block>) -> Result<bool, RpcError> {
        let hash = block.hash();
        match self.chain.accept_block(block).await? {
            AcceptOutcome::Accepted | AcceptOutcome::SideChain => {
                self.peers.announce_block(hash).await;
                Ok(true)
            }
            AcceptOutcome::AlreadyKnown => Ok(true),
            AcceptOutcome::Orphan => Err(RpcError::validation("block has no known parent")),
            AcceptOutcome::Invalid(error) => Err(RpcError::consensus(&error.to_string())),
        }
    }

    // ==== peers ====

    pub async fn add_peer(&self, addr: SocketAddr) -> Result<(), RpcError> {
        if self.peers.connect(addr).await {
            Ok(())
        } else {
            Err(RpcError::resource("the peer manager is not running"))
        }
    }

    pub async fn remove_peer(&self, addr: SocketAddr) -> Result<(), RpcError> {
        self.disconnect_peer(addr).await
    }

    pub async fn disconnect_peer(&self, addr: SocketAddr) -> Result<(), RpcError> {
        if self.peers.disconnect(addr).await {
            Ok(())
        } else {
            Err(RpcError::resource("the peer manager is not running"))
        }
    }

    pub async fn ban_peer(&self, addr: SocketAddr) -> Result<(), RpcError> {
        if self.peers.ban(addr).await {
            Ok(())
        } else {
            Err(RpcError::resource("the peer manager is not running"))
        }
    }

    pub async fn unban_peer(&self, addr: SocketAddr) -> Result<(), RpcError> {
        if self.peers.unban(addr).await {
            Ok(())
        } else {
            Err(RpcError::resource("the peer manager is not running"))
        }
    }

    pub async fn list_peers(&self) -> Vec<PeerInfo> {
        self.peers.list_peers().await
    }

    pub async fn list_banned_peers(&self) -> Vec<SocketAddr> {
        self.peers.list_banned().await
    }

    pub async fn get_peer_info(&self, addr: SocketAddr) -> Result<PeerInfo, RpcError> {
        self.peers
            .peer_info(addr)
            .await
            .ok_or_else(|| RpcError::validation("no such peer"))
    }
}

/// `limit / target` as a float, with ~60 bits of precision. Matches the
/// conventional "difficulty 1.0 at the pow limit" reporting.
fn difficulty_ratio(limit: ExpandedDifficulty, target: ExpandedDifficulty) -> f64 {
    use primitive_types::U256;

    let limit = limit.to_u256();
    let target = target.to_u256();

    // Scale the quotient up so small ratios keep fractional precision.
    const SCALE: u64 = 1 << 24;
    let scaled = limit.saturating_mul(U256::from(SCALE)) / target;
    let capped = if scaled > U256::from(u64::MAX) {
        u64::MAX
    } else {
        scaled.low_u64()
    };
    capped as f64 / SCALE as f64
}
