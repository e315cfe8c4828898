//! The chain service: a message-passing actor wrapping the engine.
//!
//! The engine is the single chain-mutation owner, so
//! instead of sharing it behind a lock, one task owns it outright and
//! everyone else — peer manager, RPC, miner — talks to it through a
//! [`ChainHandle`]. Requests carry a oneshot for the reply, and the
//! actor answers them strictly in arrival order.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use thunderbolt_chain::{
    block::{self, Block, CountedHeader},
    transaction::{self, Transaction},
    transparent::{AddressHash, LockScript, OutPoint},
};
use thunderbolt_state::{BlockMetadata, StorageError, TransactionLocation, Utxo};

use crate::chain::{AcceptOutcome, ChainEngine};
use crate::mempool::MempoolInsertOutcome;
use crate::miner::WorkTemplate;

/// A request to the chain service.
#[derive(Debug)]
pub enum Request {
    AcceptBlock(Arc<Block>),
    AddTransaction(Arc<Transaction>),
    Tip,
    Metadata(block::Hash),
    Block(block::Hash),
    /// A transaction by id, looking in the mempool first, then the chain.
    Transaction(transaction::Hash),
    TransactionLocation(transaction::Hash),
    Utxo(OutPoint),
    UtxosByAddress(AddressHash),
    MempoolContains(transaction::Hash),
    MempoolHashes,
    MempoolStats,
    BlockLocator,
    HashesAfterLocator {
        locator: Vec<block::Hash>,
        stop: Option<block::Hash>,
        limit: usize,
    },
    HeadersAfterLocator {
        locator: Vec<block::Hash>,
        stop: Option<block::Hash>,
        limit: usize,
    },
    WorkTemplate {
        payout: LockScript,
    },
}

/// A response from the chain service.
#[derive(Debug)]
pub enum Response {
    Accepted(AcceptOutcome),
    TransactionAdded(MempoolInsertOutcome),
    Tip(BlockMetadata),
    Metadata(Option<BlockMetadata>),
    Block(Option<Arc<Block>>),
    Transaction(Option<Arc<Transaction>>),
    TransactionLocation(Option<TransactionLocation>),
    Utxo(Option<Utxo>),
    Utxos(Vec<Utxo>),
    MempoolContains(bool),
    MempoolHashes(Vec<transaction::Hash>),
    MempoolStats {
        count: usize,
        size_bytes: usize,
        last_updated: u64,
    },
    BlockLocator(Vec<block::Hash>),
    Hashes(Vec<block::Hash>),
    Headers(Vec<CountedHeader>),
    WorkTemplate(WorkTemplate),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("the chain service has shut down")]
    Closed,
}

type ReplySender = oneshot::Sender<Result<Response, StorageError>>;

/// A clonable handle to the chain service actor.
#[derive(Clone)]
pub struct ChainHandle {
    sender: mpsc::Sender<(Request, ReplySender)>,
}

impl ChainHandle {
    pub async fn call(&self, request: Request) -> Result<Response, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send((request, reply))
            .await
            .map_err(|_| ServiceError::Closed)?;
        response
            .await
            .map_err(|_| ServiceError::Closed)?
            .map_err(ServiceError::Storage)
    }

    pub async fn accept_block(&self, block: Arc<Block>) -> Result<AcceptOutcome, ServiceError> {
        match self.call(Request::AcceptBlock(block)).await? {
            Response::Accepted(outcome) => Ok(outcome),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn add_transaction(
        &self,
        tx: Arc<Transaction>,
    ) -> Result<MempoolInsertOutcome, ServiceError> {
        match self.call(Request::AddTransaction(tx)).await? {
            Response::TransactionAdded(outcome) => Ok(outcome),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn tip(&self) -> Result<BlockMetadata, ServiceError> {
        match self.call(Request::Tip).await? {
            Response::Tip(tip) => Ok(tip),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn block(&self, hash: block::Hash) -> Result<Option<Arc<Block>>, ServiceError> {
        match self.call(Request::Block(hash)).await? {
            Response::Block(block) => Ok(block),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn transaction(
        &self,
        hash: transaction::Hash,
    ) -> Result<Option<Arc<Transaction>>, ServiceError> {
        match self.call(Request::Transaction(hash)).await? {
            Response::Transaction(tx) => Ok(tx),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn block_locator(&self) -> Result<Vec<block::Hash>, ServiceError> {
        match self.call(Request::BlockLocator).await? {
            Response::BlockLocator(locator) => Ok(locator),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn mempool_hashes(&self) -> Result<Vec<transaction::Hash>, ServiceError> {
        match self.call(Request::MempoolHashes).await? {
            Response::MempoolHashes(hashes) => Ok(hashes),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn hashes_after_locator(
        &self,
        locator: Vec<block::Hash>,
        stop: Option<block::Hash>,
        limit: usize,
    ) -> Result<Vec<block::Hash>, ServiceError> {
        let request = Request::HashesAfterLocator {
            locator,
            stop,
            limit,
        };
        match self.call(request).await? {
            Response::Hashes(hashes) => Ok(hashes),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }

    pub async fn headers_after_locator(
        &self,
        locator: Vec<block::Hash>,
        stop: Option<block::Hash>,
        limit: usize,
    ) -> Result<Vec<CountedHeader>, ServiceError> {
        let request = Request::HeadersAfterLocator {
            locator,
            stop,
            limit,
        };
        match self.call(request).await? {
            Response::Headers(headers) => Ok(headers),
            _ => unreachable!("chain service answered with the wrong response variant"),
        }
    }
}

/// Spawn the chain service actor, transferring ownership of the engine
/// to it. The task ends when every handle is dropped.
pub fn spawn(mut engine: ChainEngine) -> (ChainHandle, JoinHandle<()>) {
    let (sender, mut receiver) = mpsc::channel::<(Request, ReplySender)>(64);

    let task = tokio::spawn(async move {
        while let Some((request, reply)) = receiver.recv().await {
            let result = handle_request(&mut engine, request);
            // A dropped reply means the caller gave up; fine either way.
            let _ = reply.send(result);
        }
        debug!("chain service stopped");
    });

    (ChainHandle { sender }, task)
}

fn handle_request(
    engine: &mut ChainEngine,
    request: Request,
) -> Result<Response, StorageError> {
    match request {
        Request::AcceptBlock(block) => Ok(Response::Accepted(engine.accept(block)?)),
        Request::AddTransaction(tx) => {
            Ok(Response::TransactionAdded(engine.add_transaction(tx)?))
        }
        Request::Tip => Ok(Response::Tip(engine.tip().clone())),
        Request::Metadata(hash) => Ok(Response::Metadata(engine.state().metadata(&hash)?)),
        Request::Block(hash) => Ok(Response::Block(engine.state().block(&hash)?)),
        Request::Transaction(hash) => {
            if let Some(tx) = engine.mempool().get(&hash) {
                return Ok(Response::Transaction(Some(tx)));
            }
            Ok(Response::Transaction(engine.state().transaction(&hash)?))
        }
        Request::TransactionLocation(hash) => Ok(Response::TransactionLocation(
            engine.state().transaction_location(&hash)?,
        )),
        Request::Utxo(outpoint) => Ok(Response::Utxo(engine.state().utxo(&outpoint)?)),
        Request::UtxosByAddress(address) => Ok(Response::Utxos(
            engine.state().utxos_by_address(&address)?,
        )),
        Request::MempoolContains(hash) => {
            Ok(Response::MempoolContains(engine.mempool().contains(&hash)))
        }
        Request::MempoolHashes => Ok(Response::MempoolHashes(
            engine.mempool().transaction_hashes(),
        )),
        Request::MempoolStats => Ok(Response::MempoolStats {
            count: engine.mempool().count(),
            size_bytes: engine.mempool().size_bytes(),
            last_updated: engine.mempool().last_updated(),
        }),
        Request::BlockLocator => Ok(Response::BlockLocator(engine.state().block_locator()?)),
        Request::HashesAfterLocator {
            locator,
            stop,
            limit,
        } => Ok(Response::Hashes(
            engine.hashes_after_locator(&locator, stop, limit)?,
        )),
        Request::HeadersAfterLocator {
            locator,
            stop,
            limit,
        } => Ok(Response::Headers(
            engine.headers_after_locator(&locator, stop, limit)?,
        )),
        Request::WorkTemplate { payout } => {
            Ok(Response::WorkTemplate(engine.work_template(&payout)?))
        }
    }
}
