//! Initial block download bookkeeping.
//!
//! The peer manager elects one peer as the sync source when its best
//! announced height is far past our tip, then keeps a `getblocks`
//! pipeline running against it until we catch up. This type only holds
//! the bookkeeping; the decisions live in the manager.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thunderbolt_chain::block;

/// The sync controller's state.
pub struct SyncState {
    /// The elected sync peer, while initial block download is running.
    sync_peer: Option<SocketAddr>,
    /// Blocks requested from the sync peer and not yet received.
    outstanding: HashSet<block::Hash>,
    /// Shared with RPC for `isInitialBlockDownload`.
    is_ibd: Arc<AtomicBool>,
}

impl SyncState {
    pub fn new(is_ibd: Arc<AtomicBool>) -> SyncState {
        SyncState {
            sync_peer: None,
            outstanding: HashSet::new(),
            is_ibd,
        }
    }

    pub fn sync_peer(&self) -> Option<SocketAddr> {
        self.sync_peer
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_peer.is_some()
    }

    pub fn begin(&mut self, peer: SocketAddr) {
        self.sync_peer = Some(peer);
        self.outstanding.clear();
        self.is_ibd.store(true, Ordering::SeqCst);
    }

    pub fn finish(&mut self) {
        self.sync_peer = None;
        self.outstanding.clear();
        self.is_ibd.store(false, Ordering::SeqCst);
    }

    pub fn record_requested(&mut self, hash: block::Hash) {
        self.outstanding.insert(hash);
    }

    /// Mark a block received; returns true when the pipeline drained.
    pub fn record_received(&mut self, hash: &block::Hash) -> bool {
        self.outstanding.remove(hash);
        self.outstanding.is_empty()
    }

    pub fn outstanding_len(&self) -> usize {
        self.outstanding.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_lifecycle_flips_the_ibd_flag() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut sync = SyncState::new(flag.clone());

        assert!(!sync.is_syncing());

        let peer = "127.0.0.1:8533".parse().unwrap();
        sync.begin(peer);
        assert!(sync.is_syncing());
        assert!(flag.load(Ordering::SeqCst));

        sync.record_requested(block::Hash([1u8; 32]));
        sync.record_requested(block::Hash([2u8; 32]));
        assert!(!sync.record_received(&block::Hash([1u8; 32])));
        assert!(sync.record_received(&block::Hash([2u8; 32])));

        sync.finish();
        assert!(!sync.is_syncing());
        assert!(!flag.load(Ordering::SeqCst));
    }
}
