//! The peer manager: one control task owning every connection.
//!
//! All peer state mutation happens here, on one task, so per-peer
//! message order is preserved and nothing needs a lock. The reader
//! tasks feed one event inbox; timers drive the heartbeat, the
//! inactivity sweep, outbound dialing, and address maintenance; and a
//! command channel serves the RPC surface.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use thunderbolt_chain::{block, transaction};
use thunderbolt_consensus::chain::AcceptOutcome;
use thunderbolt_consensus::mempool::MempoolInsertOutcome;
use thunderbolt_consensus::service::{
    ChainHandle, Request as ChainRequest, Response as ChainResponse,
};

use crate::address_book::AddressBook;
use crate::config::Config;
use crate::constants::*;
use crate::meta_addr::MetaAddr;
use crate::peer::connection::{self, ConnectionHandle, PeerEvent};
use crate::peer::{Direction, PeerState};
use crate::protocol::external::types::{Nonce, PeerServices};
use crate::protocol::external::{GetBlocks, GetHeaders, InventoryHash, Message, Version};
use crate::sync::SyncState;

/// One connected (or connecting) peer.
struct Peer {
    state: PeerState,
    connection: ConnectionHandle,
}

/// Commands from the RPC surface into the control task.
#[derive(Debug)]
pub enum PeerCommand {
    Connect(SocketAddr),
    Disconnect(SocketAddr),
    Ban(SocketAddr),
    Unban(SocketAddr),
    /// Announce a freshly accepted block (e.g. from `submitBlock`).
    AnnounceBlock(block::Hash),
    /// Announce a freshly submitted transaction (e.g. from the wallet).
    AnnounceTransaction(transaction::Hash),
    ListPeers(oneshot::Sender<Vec<PeerInfo>>),
    ListBanned(oneshot::Sender<Vec<SocketAddr>>),
    GetPeerInfo(SocketAddr, oneshot::Sender<Option<PeerInfo>>),
}

/// A point-in-time view of one peer, for operators.
#[derive(Clone, Debug, Serialize)]
pub struct PeerInfo {
    pub addr: SocketAddr,
    pub direction: &'static str,
    pub handshake: String,
    pub user_agent: String,
    pub ban_score: u32,
    pub best_height: u64,
    pub seconds_connected: u64,
    pub is_sync_peer: bool,
}

/// The outside world's handle to the peer manager.
#[derive(Clone)]
pub struct PeerSetHandle {
    commands: mpsc::Sender<PeerCommand>,
    is_ibd: Arc<AtomicBool>,
    local_addr: SocketAddr,
}

impl PeerSetHandle {
    /// The address the listener actually bound (port 0 resolves here).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn send(&self, command: PeerCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    pub async fn connect(&self, addr: SocketAddr) -> bool {
        self.send(PeerCommand::Connect(addr)).await
    }

    pub async fn disconnect(&self, addr: SocketAddr) -> bool {
        self.send(PeerCommand::Disconnect(addr)).await
    }

    pub async fn ban(&self, addr: SocketAddr) -> bool {
        self.send(PeerCommand::Ban(addr)).await
    }

    pub async fn unban(&self, addr: SocketAddr) -> bool {
        self.send(PeerCommand::Unban(addr)).await
    }

    pub async fn announce_block(&self, hash: block::Hash) -> bool {
        self.send(PeerCommand::AnnounceBlock(hash)).await
    }

    pub async fn announce_transaction(&self, hash: transaction::Hash) -> bool {
        self.send(PeerCommand::AnnounceTransaction(hash)).await
    }

    pub async fn list_peers(&self) -> Vec<PeerInfo> {
        let (reply, response) = oneshot::channel();
        if !self.send(PeerCommand::ListPeers(reply)).await {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    pub async fn list_banned(&self) -> Vec<SocketAddr> {
        let (reply, response) = oneshot::channel();
        if !self.send(PeerCommand::ListBanned(reply)).await {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    pub async fn peer_info(&self, addr: SocketAddr) -> Option<PeerInfo> {
        let (reply, response) = oneshot::channel();
        if !self.send(PeerCommand::GetPeerInfo(addr, reply)).await {
            return None;
        }
        response.await.ok().flatten()
    }

    /// Whether initial block download is still running.
    pub fn is_initial_block_download(&self) -> bool {
        self.is_ibd.load(Ordering::SeqCst)
    }
}

/// Bind the listener and spawn the peer manager.
pub async fn init(
    config: Config,
    chain: ChainHandle,
    shutdown: watch::Receiver<bool>,
) -> std::io::Result<(PeerSetHandle, JoinHandle<()>)> {
    let listener = TcpListener::bind(config.listen_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, network = %config.network, "listening for peers");

    let (events_tx, events_rx) = mpsc::channel(1024);
    let (commands_tx, commands_rx) = mpsc::channel(64);
    let is_ibd = Arc::new(AtomicBool::new(false));

    let address_book = match &config.address_book_path {
        Some(path) => AddressBook::load(path),
        None => AddressBook::new(),
    };

    let peer_set = PeerSet {
        config,
        chain,
        address_book,
        peers: HashMap::new(),
        events_tx,
        local_nonces: HashSet::new(),
        dialing: HashSet::new(),
        sync: SyncState::new(is_ibd.clone()),
        last_dial: None,
    };

    let handle = PeerSetHandle {
        commands: commands_tx,
        is_ibd,
        local_addr,
    };
    let task = tokio::spawn(peer_set.run(listener, events_rx, commands_rx, shutdown));

    Ok((handle, task))
}

struct PeerSet {
    config: Config,
    chain: ChainHandle,
    address_book: AddressBook,
    peers: HashMap<SocketAddr, Peer>,
    events_tx: mpsc::Sender<PeerEvent>,
    /// Nonces of our own in-flight `version` messages, for
    /// self-connection detection.
    local_nonces: HashSet<Nonce>,
    /// Outbound dials in progress.
    dialing: HashSet<SocketAddr>,
    sync: SyncState,
    last_dial: Option<Instant>,
}

impl PeerSet {
    async fn run(
        mut self,
        listener: TcpListener,
        mut events_rx: mpsc::Receiver<PeerEvent>,
        mut commands_rx: mpsc::Receiver<PeerCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        let mut maintenance = tokio::time::interval(ADDRESS_MAINTENANCE_INTERVAL);
        let mut dial_timer = tokio::time::interval(std::time::Duration::from_secs(10));

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => self.register_peer(stream, addr, Direction::Inbound).await,
                        Err(error) => warn!(%error, "failed to accept inbound connection"),
                    }
                }
                Some(event) = events_rx.recv() => {
                    self.handle_event(event).await;
                }
                Some(command) = commands_rx.recv() => {
                    self.handle_command(command).await;
                }
                _ = heartbeat.tick() => {
                    self.heartbeat();
                }
                _ = sweep.tick() => {
                    self.remove_inactive();
                    self.maybe_start_sync().await;
                }
                _ = maintenance.tick() => {
                    self.address_maintenance();
                }
                _ = dial_timer.tick() => {
                    self.connect_new_peers().await;
                }
            }
        }

        info!("peer manager shutting down");
        for (_, peer) in self.peers.drain() {
            peer.connection.shutdown();
        }
        self.address_book.persist_if_dirty();
    }

    // ==== connection lifecycle ====

    async fn register_peer(&mut self, stream: TcpStream, addr: SocketAddr, direction: Direction) {
        if self.address_book.is_banned(&addr) {
            debug!(%addr, "refusing connection to banned address");
            return;
        }
        if self.peers.contains_key(&addr) {
            debug!(%addr, "already connected");
            return;
        }

        debug!(%addr, ?direction, "peer connected");
        let handle = connection::spawn(stream, addr, self.config.network, self.events_tx.clone());
        self.peers.insert(
            addr,
            Peer {
                state: PeerState::new(addr, direction),
                connection: handle,
            },
        );

        if direction == Direction::Outbound {
            self.address_book.update(MetaAddr {
                last_seen: Utc::now(),
                services: PeerServices::NODE_NETWORK,
                addr,
            });
            self.send_version(addr).await;
        }
    }

    fn remove_peer(&mut self, addr: &SocketAddr, reason: &str) {
        if let Some(peer) = self.peers.remove(addr) {
            debug!(%addr, reason, "dropping peer");
            if let Some(nonce) = peer.state.local_nonce {
                self.local_nonces.remove(&nonce);
            }
            if self.sync.sync_peer() == Some(*addr) {
                self.sync.finish();
            }
            peer.connection.shutdown();
        }
    }

    fn punish(&mut self, addr: &SocketAddr, points: u32, reason: &str) {
        let banned = match self.peers.get_mut(addr) {
            Some(peer) => {
                warn!(%addr, points, reason, score = peer.state.ban_score + points, "misbehaving peer");
                peer.state.add_ban_score(points)
            }
            None => return,
        };
        if banned {
            self.address_book.ban(*addr);
            self.address_book.persist_if_dirty();
            self.remove_peer(addr, "ban threshold reached");
        }
    }

    fn send(&mut self, addr: &SocketAddr, message: Message) {
        if let Some(peer) = self.peers.get_mut(addr) {
            peer.state.last_sent = Instant::now();
            if !peer.connection.send(message) {
                trace!(%addr, "outbound queue full, dropping message");
            }
        }
    }

    async fn send_version(&mut self, addr: SocketAddr) {
        let height = match self.chain.tip().await {
            Ok(tip) => tip.height,
            Err(error) => {
                warn!(%error, "chain service unavailable");
                return;
            }
        };

        let nonce = Nonce::default();
        self.local_nonces.insert(nonce);

        let version = Version::new(
            CURRENT_VERSION,
            addr,
            PeerServices::NODE_NETWORK,
            PeerServices::NODE_NETWORK,
            self.config.listen_addr,
            nonce,
            USER_AGENT.to_owned(),
            height,
            true,
        );

        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.state.local_nonce = Some(nonce);
            peer.state.version_sent = true;
        }
        self.send(&addr, Message::Version(version));
    }

    // ==== event handling ====

    async fn handle_event(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Message(addr, message) => {
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.state.last_received = Instant::now();
                } else {
                    return;
                }
                self.dispatch(addr, message).await;
            }
            PeerEvent::ProtocolViolation(addr, error) => {
                self.punish(&addr, PROTOCOL_VIOLATION_SCORE, &error.to_string());
            }
            PeerEvent::Closed(addr) => {
                self.remove_peer(&addr, "connection closed");
            }
            PeerEvent::Connected(addr, stream) => {
                self.dialing.remove(&addr);
                self.register_peer(stream, addr, Direction::Outbound).await;
            }
            PeerEvent::ConnectFailed(addr) => {
                self.dialing.remove(&addr);
                debug!(%addr, "outbound dial failed");
            }
        }
    }

    /// Dispatch one message from one peer.
    async fn dispatch(&mut self, addr: SocketAddr, message: Message) {
        // Before the handshake completes, only handshake traffic counts.
        let active = match self.peers.get(&addr) {
            Some(peer) => peer.state.is_active(),
            None => return,
        };
        if !active
            && !matches!(
                message,
                Message::Version(_) | Message::Verack | Message::Ping(_) | Message::Pong(_)
            )
        {
            self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "message before handshake");
            return;
        }

        match message {
            Message::Version(version) => self.handle_version(addr, version).await,
            Message::Verack => {
                let version_sent = match self.peers.get(&addr) {
                    Some(peer) => peer.state.version_sent,
                    None => return,
                };
                if !version_sent {
                    self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "verack before version");
                    return;
                }
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.state.verack_received = true;
                }
                self.maybe_activate(addr).await;
            }
            Message::Ping(nonce) => {
                self.send(&addr, Message::Pong(nonce));
            }
            Message::Pong(nonce) => {
                let matched = self
                    .peers
                    .get_mut(&addr)
                    .map(|peer| peer.state.pending_pings.remove(&nonce).is_some())
                    .unwrap_or(false);
                if !matched {
                    self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "unmatched pong");
                }
            }
            Message::GetAddr => {
                let addrs = self.address_book.sanitized(MAX_ADDRS_PER_MESSAGE);
                self.send(&addr, Message::Addr(addrs));
            }
            Message::Addr(addrs) => self.handle_addr(addr, addrs),
            Message::Inv(items) => self.handle_inv(addr, items).await,
            Message::GetData(items) => self.handle_getdata(addr, items).await,
            Message::NotFound(items) => {
                trace!(%addr, count = items.len(), "peer reported missing inventory");
            }
            Message::Tx(tx) => self.handle_tx(addr, tx).await,
            Message::Block(block) => self.handle_block(addr, block).await,
            Message::GetBlocks(request) => self.handle_getblocks(addr, request).await,
            Message::GetHeaders(request) => self.handle_getheaders(addr, request).await,
            Message::Headers(headers) => self.handle_headers(addr, headers).await,
            Message::Mempool => self.handle_mempool(addr).await,
        }
    }

    async fn handle_version(&mut self, addr: SocketAddr, version: Version) {
        if self.local_nonces.contains(&version.nonce) {
            info!(%addr, "connected to ourselves, closing");
            self.remove_peer(&addr, "self connection");
            return;
        }
        if version.version < MIN_VERSION {
            debug!(%addr, version = ?version.version, "peer is too old");
            self.remove_peer(&addr, "obsolete protocol version");
            return;
        }

        let already_received = match self.peers.get(&addr) {
            Some(peer) => peer.state.version_received,
            None => return,
        };
        if already_received {
            self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "duplicate version");
            return;
        }

        let (respond_with_version, direction) = match self.peers.get_mut(&addr) {
            Some(peer) => {
                peer.state.version_received = true;
                peer.state.best_height = version.start_height;
                peer.state.mark_addr_known(version.address_from.1);
                peer.state.version = Some(version.clone());
                (!peer.state.version_sent, peer.state.direction)
            }
            None => return,
        };

        // An inbound peer just told us its listening address.
        if direction == Direction::Inbound {
            self.address_book.update(MetaAddr {
                last_seen: Utc::now(),
                services: version.services,
                addr: version.address_from.1,
            });
        }

        if respond_with_version {
            self.send_version(addr).await;
        }

        // We have their version, so the verack may go out.
        self.send(&addr, Message::Verack);
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.state.verack_sent = true;
        }
        self.maybe_activate(addr).await;
    }

    async fn maybe_activate(&mut self, addr: SocketAddr) {
        let newly_active = match self.peers.get_mut(&addr) {
            Some(peer) => {
                if peer.state.is_active() && !peer.state.greeted {
                    peer.state.greeted = true;
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if !newly_active {
            return;
        }

        debug!(%addr, "handshake complete");
        self.send(&addr, Message::GetAddr);
        self.send(&addr, Message::Mempool);
        self.maybe_start_sync().await;
    }

    fn handle_addr(&mut self, addr: SocketAddr, addrs: Vec<MetaAddr>) {
        if addrs.len() > MAX_ADDRS_PER_MESSAGE {
            self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "oversized addr message");
            return;
        }

        if let Some(peer) = self.peers.get_mut(&addr) {
            for meta in &addrs {
                peer.state.mark_addr_known(meta.addr);
            }
        }
        for meta in &addrs {
            self.address_book.update(*meta);
        }
        self.address_book.persist_if_dirty();

        // Relay each address to peers that haven't seen it yet.
        let targets: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(other, peer)| **other != addr && peer.state.is_active())
            .map(|(other, _)| *other)
            .collect();
        for other in targets {
            let fresh: Vec<MetaAddr> = match self.peers.get_mut(&other) {
                Some(peer) => addrs
                    .iter()
                    .filter(|meta| !peer.state.known_addrs.contains(&meta.addr))
                    .copied()
                    .collect(),
                None => continue,
            };
            if fresh.is_empty() {
                continue;
            }
            if let Some(peer) = self.peers.get_mut(&other) {
                for meta in &fresh {
                    peer.state.mark_addr_known(meta.addr);
                }
            }
            self.send(&other, Message::Addr(fresh));
        }
    }

    async fn handle_inv(&mut self, addr: SocketAddr, items: Vec<InventoryHash>) {
        if items.len() > MAX_INV_PER_MESSAGE {
            self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "oversized inv message");
            return;
        }

        let mut wanted = Vec::new();
        for item in items {
            match item {
                InventoryHash::Block(hash) => {
                    if let Some(peer) = self.peers.get_mut(&addr) {
                        peer.state.mark_block_known(hash);
                        peer.state.best_block = Some(hash);
                    }
                    let known = match self.chain.call(ChainRequest::Metadata(hash)).await {
                        Ok(ChainResponse::Metadata(meta)) => meta.is_some(),
                        _ => continue,
                    };
                    if !known {
                        if self.sync.sync_peer() == Some(addr) {
                            self.sync.record_requested(hash);
                        }
                        wanted.push(InventoryHash::Block(hash));
                    }
                }
                InventoryHash::Tx(hash) => {
                    if let Some(peer) = self.peers.get_mut(&addr) {
                        peer.state.mark_tx_known(hash);
                    }
                    let known = match self.chain.transaction(hash).await {
                        Ok(tx) => tx.is_some(),
                        Err(_) => continue,
                    };
                    if !known {
                        wanted.push(InventoryHash::Tx(hash));
                    }
                }
            }
        }

        if !wanted.is_empty() {
            self.send(&addr, Message::GetData(wanted));
        }
    }

    async fn handle_getdata(&mut self, addr: SocketAddr, items: Vec<InventoryHash>) {
        if items.len() > MAX_INV_PER_MESSAGE {
            self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "oversized getdata message");
            return;
        }

        let mut missing = Vec::new();
        for item in items {
            match item {
                InventoryHash::Block(hash) => match self.chain.block(hash).await {
                    Ok(Some(block)) => {
                        if let Some(peer) = self.peers.get_mut(&addr) {
                            peer.state.mark_block_known(hash);
                        }
                        self.send(&addr, Message::Block(block));
                    }
                    Ok(None) => missing.push(item),
                    Err(error) => {
                        warn!(%error, "chain service unavailable");
                        return;
                    }
                },
                InventoryHash::Tx(hash) => match self.chain.transaction(hash).await {
                    Ok(Some(tx)) => {
                        if let Some(peer) = self.peers.get_mut(&addr) {
                            peer.state.mark_tx_known(hash);
                        }
                        self.send(&addr, Message::Tx(tx));
                    }
                    Ok(None) => missing.push(item),
                    Err(error) => {
                        warn!(%error, "chain service unavailable");
                        return;
                    }
                },
            }
        }

        if !missing.is_empty() {
            self.send(&addr, Message::NotFound(missing));
        }
    }

    async fn handle_tx(&mut self, addr: SocketAddr, tx: Arc<transaction::Transaction>) {
        let hash = tx.hash();
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.state.mark_tx_known(hash);
        }

        match self.chain.add_transaction(tx).await {
            Ok(MempoolInsertOutcome::Added) => {
                trace!(%hash, "relayed transaction entered mempool");
                self.relay_transaction(hash, Some(addr));
            }
            Ok(MempoolInsertOutcome::AlreadyKnown) => {}
            Ok(MempoolInsertOutcome::Invalid(error)) => {
                self.punish(&addr, CONSENSUS_VIOLATION_SCORE, &error.to_string());
            }
            Err(error) => warn!(%error, "chain service unavailable"),
        }
    }

    async fn handle_block(&mut self, addr: SocketAddr, block: Arc<block::Block>) {
        let hash = block.hash();
        if let Some(peer) = self.peers.get_mut(&addr) {
            peer.state.mark_block_known(hash);
            peer.state.last_common_block = Some(hash);
        }

        let from_sync_peer = self.sync.sync_peer() == Some(addr);
        let drained = if from_sync_peer {
            self.sync.record_received(&hash)
        } else {
            false
        };

        match self.chain.accept_block(block).await {
            Ok(AcceptOutcome::Accepted) | Ok(AcceptOutcome::SideChain) => {
                self.relay_block(hash, Some(addr));
                if from_sync_peer && drained {
                    self.continue_sync().await;
                }
            }
            Ok(AcceptOutcome::AlreadyKnown) => {}
            Ok(AcceptOutcome::Orphan) => {
                // Ask the sender to fill the gap back to our chain.
                let locator = match self.chain.block_locator().await {
                    Ok(locator) => locator,
                    Err(error) => {
                        warn!(%error, "chain service unavailable");
                        return;
                    }
                };
                self.send(
                    &addr,
                    Message::GetBlocks(GetBlocks {
                        block_locator: locator,
                        stop_hash: None,
                    }),
                );
            }
            Ok(AcceptOutcome::Invalid(error)) => {
                self.punish(&addr, CONSENSUS_VIOLATION_SCORE, &error.to_string());
            }
            Err(error) => warn!(%error, "chain service unavailable"),
        }
    }

    async fn handle_getblocks(&mut self, addr: SocketAddr, request: GetBlocks) {
        let hashes = match self
            .chain
            .hashes_after_locator(
                request.block_locator,
                request.stop_hash,
                MAX_GETBLOCKS_RESPONSE,
            )
            .await
        {
            Ok(hashes) => hashes,
            Err(error) => {
                warn!(%error, "chain service unavailable");
                return;
            }
        };

        if !hashes.is_empty() {
            let items = hashes.into_iter().map(InventoryHash::Block).collect();
            self.send(&addr, Message::Inv(items));
        }
    }

    async fn handle_getheaders(&mut self, addr: SocketAddr, request: GetHeaders) {
        let headers = match self
            .chain
            .headers_after_locator(
                request.block_locator,
                request.stop_hash,
                MAX_HEADERS_RESPONSE,
            )
            .await
        {
            Ok(headers) => headers,
            Err(error) => {
                warn!(%error, "chain service unavailable");
                return;
            }
        };
        self.send(&addr, Message::Headers(headers));
    }

    async fn handle_headers(
        &mut self,
        addr: SocketAddr,
        headers: Vec<thunderbolt_chain::block::CountedHeader>,
    ) {
        if headers.len() > MAX_HEADERS_RESPONSE {
            self.punish(&addr, PROTOCOL_VIOLATION_SCORE, "oversized headers message");
            return;
        }

        let mut wanted = Vec::new();
        for counted in headers {
            let hash = counted.header.hash();
            if let Some(peer) = self.peers.get_mut(&addr) {
                peer.state.mark_block_known(hash);
            }
            let known = match self.chain.call(ChainRequest::Metadata(hash)).await {
                Ok(ChainResponse::Metadata(meta)) => meta.is_some(),
                _ => continue,
            };
            if !known {
                wanted.push(InventoryHash::Block(hash));
            }
        }
        if !wanted.is_empty() {
            self.send(&addr, Message::GetData(wanted));
        }
    }

    async fn handle_mempool(&mut self, addr: SocketAddr) {
        let hashes = match self.chain.mempool_hashes().await {
            Ok(hashes) => hashes,
            Err(error) => {
                warn!(%error, "chain service unavailable");
                return;
            }
        };
        if hashes.is_empty() {
            return;
        }
        let items: Vec<InventoryHash> = hashes
            .into_iter()
            .take(MAX_INV_PER_MESSAGE)
            .map(InventoryHash::Tx)
            .collect();
        self.send(&addr, Message::Inv(items));
    }

    // ==== relay ====

    fn relay_block(&mut self, hash: block::Hash, skip: Option<SocketAddr>) {
        let targets: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(addr, peer)| {
                Some(**addr) != skip
                    && peer.state.is_active()
                    && !peer.state.known_blocks.contains(&hash)
            })
            .map(|(addr, _)| *addr)
            .collect();
        for target in targets {
            if let Some(peer) = self.peers.get_mut(&target) {
                peer.state.mark_block_known(hash);
            }
            self.send(&target, Message::Inv(vec![InventoryHash::Block(hash)]));
        }
    }

    fn relay_transaction(&mut self, hash: transaction::Hash, skip: Option<SocketAddr>) {
        let targets: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(addr, peer)| {
                Some(**addr) != skip
                    && peer.state.is_active()
                    && !peer.state.known_txs.contains(&hash)
            })
            .map(|(addr, _)| *addr)
            .collect();
        for target in targets {
            if let Some(peer) = self.peers.get_mut(&target) {
                peer.state.mark_tx_known(hash);
            }
            self.send(&target, Message::Inv(vec![InventoryHash::Tx(hash)]));
        }
    }

    // ==== timers ====

    fn heartbeat(&mut self) {
        let now = Instant::now();
        let quiet: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, peer)| {
                peer.state.is_active()
                    && now.duration_since(peer.state.last_sent) >= HEARTBEAT_INTERVAL
            })
            .map(|(addr, _)| *addr)
            .collect();

        for addr in quiet {
            let nonce = Nonce::default();
            if let Some(peer) = self.peers.get_mut(&addr) {
                peer.state.pending_pings.insert(nonce, now);
            }
            self.send(&addr, Message::Ping(nonce));
        }
    }

    fn remove_inactive(&mut self) {
        let now = Instant::now();
        let mut stale = Vec::new();

        for (addr, peer) in &self.peers {
            if now.duration_since(peer.state.last_received) > INACTIVITY_TIMEOUT {
                stale.push((*addr, "inactivity timeout"));
            } else if peer
                .state
                .pending_pings
                .values()
                .any(|sent| now.duration_since(*sent) > PING_TIMEOUT)
            {
                stale.push((*addr, "ping timeout"));
            } else if !peer.state.is_active()
                && now.duration_since(peer.state.connected_at) > PING_TIMEOUT
            {
                stale.push((*addr, "handshake timeout"));
            }
        }

        for (addr, reason) in stale {
            self.remove_peer(&addr, reason);
        }
    }

    fn address_maintenance(&mut self) {
        self.address_book.maintain();
        self.address_book.persist_if_dirty();
    }

    async fn connect_new_peers(&mut self) {
        let outbound = self
            .peers
            .values()
            .filter(|peer| peer.state.direction == Direction::Outbound)
            .count()
            + self.dialing.len();
        if outbound >= self.config.target_outbound_peers {
            return;
        }

        if let Some(last) = self.last_dial {
            if last.elapsed() < CONNECT_COOLDOWN {
                return;
            }
        }

        let needed = self.config.target_outbound_peers - outbound;
        let peers = &self.peers;
        let dialing = &self.dialing;
        let mut candidates = self
            .address_book
            .candidates(needed, |addr| {
                peers.contains_key(addr) || dialing.contains(addr)
            });

        if candidates.is_empty() {
            // Fall back to the configured seeds.
            candidates = self
                .config
                .initial_peers
                .iter()
                .filter(|addr| {
                    !self.peers.contains_key(*addr)
                        && !self.dialing.contains(*addr)
                        && !self.address_book.is_banned(*addr)
                })
                .take(needed)
                .copied()
                .collect();
        }

        if candidates.is_empty() {
            return;
        }

        self.last_dial = Some(Instant::now());
        for addr in candidates {
            self.dial(addr);
        }
    }

    fn dial(&mut self, addr: SocketAddr) {
        if self.peers.contains_key(&addr) || !self.dialing.insert(addr) {
            return;
        }
        debug!(%addr, "dialing peer");
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)).await;
            let event = match result {
                Ok(Ok(stream)) => PeerEvent::Connected(addr, stream),
                _ => PeerEvent::ConnectFailed(addr),
            };
            let _ = events.send(event).await;
        });
    }

    // ==== initial block download ====

    async fn maybe_start_sync(&mut self) {
        if self.sync.is_syncing() {
            return;
        }

        let tip_height = match self.chain.tip().await {
            Ok(tip) => tip.height.0,
            Err(_) => return,
        };

        let best = self
            .peers
            .iter()
            .filter(|(_, peer)| peer.state.is_active())
            .max_by_key(|(_, peer)| peer.state.best_height.0)
            .map(|(addr, peer)| (*addr, peer.state.best_height.0));

        if let Some((addr, best_height)) = best {
            if best_height > tip_height + IBD_HEIGHT_THRESHOLD {
                info!(%addr, best_height, tip_height, "starting initial block download");
                self.sync.begin(addr);
                if let Some(peer) = self.peers.get_mut(&addr) {
                    peer.state.is_sync_peer = true;
                }
                self.request_sync_batch(addr).await;
            }
        }
    }

    async fn continue_sync(&mut self) {
        let addr = match self.sync.sync_peer() {
            Some(addr) => addr,
            None => return,
        };

        let tip_height = match self.chain.tip().await {
            Ok(tip) => tip.height.0,
            Err(_) => return,
        };
        let best_height = self
            .peers
            .get(&addr)
            .map(|peer| peer.state.best_height.0)
            .unwrap_or(0);

        if tip_height >= best_height {
            info!(tip_height, "initial block download complete");
            if let Some(peer) = self.peers.get_mut(&addr) {
                peer.state.is_sync_peer = false;
            }
            self.sync.finish();
        } else {
            self.request_sync_batch(addr).await;
        }
    }

    async fn request_sync_batch(&mut self, addr: SocketAddr) {
        let locator = match self.chain.block_locator().await {
            Ok(locator) => locator,
            Err(_) => return,
        };
        self.send(
            &addr,
            Message::GetBlocks(GetBlocks {
                block_locator: locator,
                stop_hash: None,
            }),
        );
    }

    // ==== commands ====

    async fn handle_command(&mut self, command: PeerCommand) {
        match command {
            PeerCommand::Connect(addr) => self.dial(addr),
            PeerCommand::Disconnect(addr) => self.remove_peer(&addr, "requested by operator"),
            PeerCommand::Ban(addr) => {
                self.address_book.ban(addr);
                self.address_book.persist_if_dirty();
                self.remove_peer(&addr, "banned by operator");
            }
            PeerCommand::Unban(addr) => {
                self.address_book.unban(&addr);
                self.address_book.persist_if_dirty();
            }
            PeerCommand::AnnounceBlock(hash) => self.relay_block(hash, None),
            PeerCommand::AnnounceTransaction(hash) => self.relay_transaction(hash, None),
            PeerCommand::ListPeers(reply) => {
                let infos = self.peers.values().map(peer_info).collect();
                let _ = reply.send(infos);
            }
            PeerCommand::ListBanned(reply) => {
                let _ = reply.send(self.address_book.banned());
            }
            PeerCommand::GetPeerInfo(addr, reply) => {
                let _ = reply.send(self.peers.get(&addr).map(peer_info));
            }
        }
    }
}

fn peer_info(peer: &Peer) -> PeerInfo {
    PeerInfo {
        addr: peer.state.addr,
        direction: match peer.state.direction {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        },
        handshake: format!("{:?}", peer.state.handshake_state()),
        user_agent: peer
            .state
            .version
            .as_ref()
            .map(|version| version.user_agent.clone())
            .unwrap_or_default(),
        ban_score: peer.state.ban_score,
        best_height: peer.state.best_height.0,
        seconds_connected: peer.state.connected_at.elapsed().as_secs(),
        is_sync_peer: peer.state.is_sync_peer,
    }
}
