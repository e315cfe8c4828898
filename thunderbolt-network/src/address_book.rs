//! The address pool: every peer address we have heard of, with ban
//! state, persisted across restarts.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::seq::SliceRandom;
use rand::thread_rng;
use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};
use tracing::{debug, info, warn};

use thunderbolt_chain::{
    SerializationError, ThunderboltDeserialize, ThunderboltDeserializeInto, ThunderboltSerialize,
};

use crate::constants::{ADDR_STALE_AFTER, BAN_DURATION, MAX_ADDRS_IN_POOL};
use crate::meta_addr::MetaAddr;

/// One pooled address with its gossip and ban history.
#[derive(Clone, Debug, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct AddressEntry {
    pub addr: MetaAddr,
    pub first_seen: DateTime<Utc>,
    /// Pool-level misbehavior memory, distinct from the live session's
    /// ban score.
    pub ban_score: u8,
    pub banned: bool,
    /// When the ban was applied. Zero epoch when not banned.
    pub banned_at: DateTime<Utc>,
}

/// The pool of known peer addresses.
///
/// Mutations mark the book dirty; [`AddressBook::persist_if_dirty`]
/// writes the whole pool with the canonical codec, so a node restarts
/// with the peers (and the bans) it had.
pub struct AddressBook {
    by_addr: HashMap<SocketAddr, AddressEntry>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl AddressBook {
    /// An empty, unpersisted book (tests, ephemeral nodes).
    pub fn new() -> AddressBook {
        AddressBook {
            by_addr: HashMap::new(),
            path: None,
            dirty: false,
        }
    }

    /// Open the book at `path`, loading any previously persisted pool.
    /// A corrupt or missing file just starts the pool empty.
    pub fn load(path: &Path) -> AddressBook {
        let mut book = AddressBook {
            by_addr: HashMap::new(),
            path: Some(path.to_path_buf()),
            dirty: false,
        };

        match std::fs::read(path) {
            Ok(bytes) => match bytes.as_slice().thunderbolt_deserialize_into::<Vec<AddressEntry>>()
            {
                Ok(entries) => {
                    info!(count = entries.len(), "loaded address book");
                    for entry in entries {
                        book.by_addr.insert(entry.addr.addr, entry);
                    }
                }
                Err(error) => {
                    warn!(%error, "address book file is corrupt, starting empty")
                }
            },
            Err(_) => debug!("no address book file, starting empty"),
        }

        book
    }

    pub fn len(&self) -> usize {
        self.by_addr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_addr.is_empty()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.by_addr.contains_key(addr)
    }

    pub fn is_banned(&self, addr: &SocketAddr) -> bool {
        self.by_addr
            .get(addr)
            .map(|entry| entry.banned)
            .unwrap_or(false)
    }

    /// Record a gossiped or observed address, updating last-seen.
    pub fn update(&mut self, meta: MetaAddr) {
        match self.by_addr.get_mut(&meta.addr) {
            Some(entry) => {
                if meta.last_seen > entry.addr.last_seen {
                    entry.addr = meta;
                    self.dirty = true;
                }
            }
            None => {
                if self.by_addr.len() >= MAX_ADDRS_IN_POOL {
                    return;
                }
                self.by_addr.insert(
                    meta.addr,
                    AddressEntry {
                        addr: meta,
                        first_seen: Utc::now(),
                        ban_score: 0,
                        banned: false,
                        banned_at: Utc.timestamp(0, 0),
                    },
                );
                self.dirty = true;
            }
        }
    }

    /// Ban an address for [`BAN_DURATION`].
    pub fn ban(&mut self, addr: SocketAddr) {
        let now = Utc::now();
        let entry = self.by_addr.entry(addr).or_insert_with(|| AddressEntry {
            addr: MetaAddr {
                last_seen: now,
                services: Default::default(),
                addr,
            },
            first_seen: now,
            ban_score: 0,
            banned: false,
            banned_at: Utc.timestamp(0, 0),
        });
        entry.banned = true;
        entry.banned_at = now;
        entry.ban_score = entry.ban_score.saturating_add(1);
        self.dirty = true;
        info!(%addr, "banned peer address");
    }

    pub fn unban(&mut self, addr: &SocketAddr) {
        if let Some(entry) = self.by_addr.get_mut(addr) {
            if entry.banned {
                entry.banned = false;
                self.dirty = true;
            }
        }
    }

    /// Release expired bans and prune addresses nobody has seen for
    /// [`ADDR_STALE_AFTER`].
    pub fn maintain(&mut self) {
        let now = Utc::now();
        let ban_duration =
            Duration::from_std(BAN_DURATION).expect("ban duration fits in chrono range");
        let stale_after =
            Duration::from_std(ADDR_STALE_AFTER).expect("stale window fits in chrono range");

        let mut released = 0;
        for entry in self.by_addr.values_mut() {
            if entry.banned && now - entry.banned_at > ban_duration {
                entry.banned = false;
                released += 1;
            }
        }
        if released > 0 {
            debug!(released, "released expired bans");
            self.dirty = true;
        }

        let before = self.by_addr.len();
        self.by_addr
            .retain(|_, entry| entry.banned || now - entry.addr.last_seen < stale_after);
        if self.by_addr.len() != before {
            debug!(pruned = before - self.by_addr.len(), "pruned stale addresses");
            self.dirty = true;
        }
    }

    /// Up to `count` random, unbanned candidate addresses, excluding
    /// any the caller is already connected to.
    pub fn candidates(
        &self,
        count: usize,
        exclude: impl Fn(&SocketAddr) -> bool,
    ) -> Vec<SocketAddr> {
        let mut pool: Vec<SocketAddr> = self
            .by_addr
            .values()
            .filter(|entry| !entry.banned && !exclude(&entry.addr.addr))
            .map(|entry| entry.addr.addr)
            .collect();
        pool.shuffle(&mut thread_rng());
        pool.truncate(count);
        pool
    }

    /// The gossip view of the pool for `getaddr` replies: unbanned
    /// addresses, at most `limit`.
    pub fn sanitized(&self, limit: usize) -> Vec<MetaAddr> {
        let mut addrs: Vec<MetaAddr> = self
            .by_addr
            .values()
            .filter(|entry| !entry.banned)
            .map(|entry| entry.addr)
            .collect();
        addrs.shuffle(&mut thread_rng());
        addrs.truncate(limit);
        addrs
    }

    /// The currently banned addresses.
    pub fn banned(&self) -> Vec<SocketAddr> {
        self.by_addr
            .values()
            .filter(|entry| entry.banned)
            .map(|entry| entry.addr.addr)
            .collect()
    }

    /// Write the pool to disk if anything changed since the last write.
    pub fn persist_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        let path = match &self.path {
            Some(path) => path.clone(),
            None => return,
        };

        let entries: Vec<AddressEntry> = self.by_addr.values().cloned().collect();
        let bytes = match entries.thunderbolt_serialize_to_vec() {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "failed to serialize address book");
                return;
            }
        };

        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let tmp = path.with_extension("tmp");
        let result = std::fs::write(&tmp, &bytes).and_then(|_| std::fs::rename(&tmp, &path));
        match result {
            Ok(()) => self.dirty = false,
            Err(error) => warn!(%error, "failed to persist address book"),
        }
    }
}

impl Default for AddressBook {
    fn default() -> Self {
        AddressBook::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::external::types::PeerServices;

    fn meta(port: u16) -> MetaAddr {
        MetaAddr {
            last_seen: Utc::now(),
            services: PeerServices::NODE_NETWORK,
            addr: format!("127.0.0.1:{}", port).parse().unwrap(),
        }
    }

    #[test]
    fn update_ban_and_candidate_selection() {
        thunderbolt_test::init();

        let mut book = AddressBook::new();
        book.update(meta(1000));
        book.update(meta(1001));
        assert_eq!(book.len(), 2);

        let banned_addr = meta(1000).addr;
        book.ban(banned_addr);
        assert!(book.is_banned(&banned_addr));

        let candidates = book.candidates(10, |_| false);
        assert_eq!(candidates, vec![meta(1001).addr]);

        book.unban(&banned_addr);
        assert_eq!(book.candidates(10, |_| false).len(), 2);
    }

    #[test]
    fn persistence_roundtrip() {
        thunderbolt_test::init();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("peers").join("address_book.dat");

        let mut book = AddressBook::load(&path);
        book.update(meta(2000));
        book.ban(meta(2001).addr);
        book.persist_if_dirty();

        let reloaded = AddressBook::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.contains(&meta(2000).addr));
        assert!(reloaded.is_banned(&meta(2001).addr));
    }

    #[test]
    fn pool_size_is_bounded() {
        thunderbolt_test::init();

        let mut book = AddressBook::new();
        for port in 0..(MAX_ADDRS_IN_POOL + 50) {
            book.update(meta(port as u16));
        }
        assert!(book.len() <= MAX_ADDRS_IN_POOL);
    }
}
