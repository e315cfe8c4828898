//! Per-connection peer state.

pub mod connection;
mod error;

pub use error::PeerError;

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Instant;

use thunderbolt_chain::{block, transaction};

use crate::constants::{BAN_THRESHOLD, MAX_KNOWN_INVENTORY};
use crate::protocol::external::types::Nonce;
use crate::protocol::external::Version;

/// Whether we dialed the peer or it dialed us.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// The handshake progression, for diagnostics and gating.
///
/// Either side may send `version` first; each side sends `verack` only
/// after receiving the other's `version`, and the connection is
/// `Active` once both `verack`s have crossed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HandshakeState {
    Init,
    SentVersion,
    ReceivedVersion,
    SentVerack,
    Active,
}

/// Everything the peer manager tracks about one connection.
///
/// Only the manager's control task touches this, so there is no
/// locking; the reader and writer tasks never see it.
#[derive(Debug)]
pub struct PeerState {
    pub addr: SocketAddr,
    pub direction: Direction,

    pub version_sent: bool,
    pub version_received: bool,
    pub verack_sent: bool,
    pub verack_received: bool,

    /// The peer's `version` message, once received.
    pub version: Option<Version>,
    /// The nonce we used in our own `version` to this peer.
    pub local_nonce: Option<Nonce>,

    /// Accumulated misbehavior. At [`BAN_THRESHOLD`] the peer is
    /// disconnected and its address banned.
    pub ban_score: u32,

    /// Outstanding pings: nonce to send time.
    pub pending_pings: HashMap<Nonce, Instant>,

    /// Inventory the peer is known to have (or to have been sent).
    pub known_blocks: HashSet<block::Hash>,
    pub known_txs: HashSet<transaction::Hash>,
    pub known_addrs: HashSet<SocketAddr>,

    /// The best block the peer has announced.
    pub best_block: Option<block::Hash>,
    pub best_height: block::Height,
    /// The most recent block of ours the peer is known to share.
    pub last_common_block: Option<block::Hash>,
    /// Whether this peer is the elected initial-block-download source.
    pub is_sync_peer: bool,
    /// Whether the post-handshake greeting (getaddr, mempool) went out.
    pub greeted: bool,

    pub last_received: Instant,
    pub last_sent: Instant,
    pub connected_at: Instant,
}

impl PeerState {
    pub fn new(addr: SocketAddr, direction: Direction) -> PeerState {
        let now = Instant::now();
        PeerState {
            addr,
            direction,
            version_sent: false,
            version_received: false,
            verack_sent: false,
            verack_received: false,
            version: None,
            local_nonce: None,
            ban_score: 0,
            pending_pings: HashMap::new(),
            known_blocks: HashSet::new(),
            known_txs: HashSet::new(),
            known_addrs: HashSet::new(),
            best_block: None,
            best_height: block::Height(0),
            last_common_block: None,
            is_sync_peer: false,
            greeted: false,
            last_received: now,
            last_sent: now,
            connected_at: now,
        }
    }

    /// The handshake phase, derived from the flag pairs.
    pub fn handshake_state(&self) -> HandshakeState {
        if self.verack_sent && self.verack_received {
            HandshakeState::Active
        } else if self.verack_sent {
            HandshakeState::SentVerack
        } else if self.version_received {
            HandshakeState::ReceivedVersion
        } else if self.version_sent {
            HandshakeState::SentVersion
        } else {
            HandshakeState::Init
        }
    }

    pub fn is_active(&self) -> bool {
        self.handshake_state() == HandshakeState::Active
    }

    /// Add misbehavior points. Returns true once the peer crosses the
    /// ban threshold.
    pub fn add_ban_score(&mut self, points: u32) -> bool {
        self.ban_score = self.ban_score.saturating_add(points);
        self.ban_score >= BAN_THRESHOLD
    }

    pub fn mark_block_known(&mut self, hash: block::Hash) {
        if self.known_blocks.len() >= MAX_KNOWN_INVENTORY {
            self.known_blocks.clear();
        }
        self.known_blocks.insert(hash);
    }

    pub fn mark_tx_known(&mut self, hash: transaction::Hash) {
        if self.known_txs.len() >= MAX_KNOWN_INVENTORY {
            self.known_txs.clear();
        }
        self.known_txs.insert(hash);
    }

    pub fn mark_addr_known(&mut self, addr: SocketAddr) {
        if self.known_addrs.len() >= MAX_KNOWN_INVENTORY {
            self.known_addrs.clear();
        }
        self.known_addrs.insert(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8533".parse().unwrap()
    }

    #[test]
    fn handshake_progresses_through_each_phase() {
        let mut state = PeerState::new(test_addr(), Direction::Outbound);
        assert_eq!(state.handshake_state(), HandshakeState::Init);

        state.version_sent = true;
        assert_eq!(state.handshake_state(), HandshakeState::SentVersion);

        state.version_received = true;
        assert_eq!(state.handshake_state(), HandshakeState::ReceivedVersion);

        state.verack_sent = true;
        assert_eq!(state.handshake_state(), HandshakeState::SentVerack);

        state.verack_received = true;
        assert_eq!(state.handshake_state(), HandshakeState::Active);
        assert!(state.is_active());
    }

    #[test]
    fn ban_score_saturates_and_trips_the_threshold() {
        let mut state = PeerState::new(test_addr(), Direction::Inbound);
        assert!(!state.add_ban_score(10));
        assert!(!state.add_ban_score(89));
        assert!(state.add_ban_score(1));
        assert!(state.add_ban_score(u32::MAX));
    }

    #[test]
    fn known_inventory_is_bounded() {
        let mut state = PeerState::new(test_addr(), Direction::Inbound);
        for i in 0..(MAX_KNOWN_INVENTORY + 10) {
            let mut bytes = [0u8; 32];
            bytes[..8].copy_from_slice(&(i as u64).to_le_bytes());
            state.mark_block_known(block::Hash(bytes));
        }
        assert!(state.known_blocks.len() <= MAX_KNOWN_INVENTORY);
    }
}
