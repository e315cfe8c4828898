//! Definitions of network protocol constants.

use std::time::Duration;

use crate::protocol::external::types::ProtocolVersion;

/// The protocol version we speak.
pub const CURRENT_VERSION: ProtocolVersion = ProtocolVersion(70001);

/// The lowest protocol version we'll complete a handshake with.
pub const MIN_VERSION: ProtocolVersion = ProtocolVersion(70001);

/// The user agent we advertise in `version` messages.
pub const USER_AGENT: &str = "/thunderbolt:0.1.0/";

/// Maximum size of a protocol message body.
pub const MAX_PROTOCOL_MESSAGE_LEN: usize = 2 * 1024 * 1024;

/// The most addresses a single `addr` message may carry.
pub const MAX_ADDRS_PER_MESSAGE: usize = 1000;

/// The most `inv` entries a `getblocks` reply may carry.
pub const MAX_GETBLOCKS_RESPONSE: usize = 500;

/// The most headers a `getheaders` reply may carry.
pub const MAX_HEADERS_RESPONSE: usize = 2000;

/// The most entries we'll accept in one `inv` or `getdata` message.
pub const MAX_INV_PER_MESSAGE: usize = 50_000;

/// The cap on each per-peer known-inventory set. Past it the set is
/// reset; a little re-relay beats unbounded memory for hostile peers.
pub const MAX_KNOWN_INVENTORY: usize = 10_000;

/// How long a peer may stay quiet before we ping it.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(120);

/// How long an unanswered ping hangs before the peer is disconnected.
pub const PING_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a peer may send nothing at all before disconnection.
pub const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// How often the inactivity/ping sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// The minimum pause between waves of outbound dials.
pub const CONNECT_COOLDOWN: Duration = Duration::from_secs(60);

/// The reachability probe deadline for one outbound dial.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How often expired bans are released and stale addresses pruned.
pub const ADDRESS_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(600);

/// The ban score at which a peer is disconnected and its address banned.
pub const BAN_THRESHOLD: u32 = 100;

/// Ban score for a protocol violation (bad checksum, oversize, junk).
pub const PROTOCOL_VIOLATION_SCORE: u32 = 10;

/// Ban score for a consensus violation (invalid block or transaction).
pub const CONSENSUS_VIOLATION_SCORE: u32 = 100;

/// How long an address ban lasts.
pub const BAN_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Addresses unseen for this long fall out of the pool.
pub const ADDR_STALE_AFTER: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// The address pool stops growing past this many entries.
pub const MAX_ADDRS_IN_POOL: usize = 5000;

/// Initial block download engages when the best peer claims a chain
/// this many blocks past our tip.
pub const IBD_HEIGHT_THRESHOLD: u64 = 24;
