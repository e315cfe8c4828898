//! An address with metadata, as exchanged in `addr` messages.

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};

use thunderbolt_chain::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};

use crate::protocol::external::types::PeerServices;

/// An address of a peer, with the metadata gossip carries about it.
///
/// On the wire the address is a 16-byte IPv6 address (IPv4 addresses
/// are v4-mapped) followed by a big-endian port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct MetaAddr {
    /// When a peer last claimed to have heard from this address.
    ///
    /// Gossiped timestamps are hints, not facts: peers lie, so the
    /// address book keeps its own observations too.
    pub last_seen: DateTime<Utc>,

    /// The services the address advertised.
    pub services: PeerServices,

    /// The peer's socket address.
    pub addr: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::net::{IpAddr, Ipv4Addr};
    use thunderbolt_chain::ThunderboltDeserializeInto;

    #[test]
    fn meta_addr_roundtrip() {
        let addr = MetaAddr {
            last_seen: Utc.timestamp(1_600_000_000, 0),
            services: PeerServices::NODE_NETWORK,
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 6)), 8533),
        };

        let bytes = addr.thunderbolt_serialize_to_vec().unwrap();
        // timestamp (8) + services (8) + ip (16) + port (2)
        assert_eq!(bytes.len(), 34);

        let parsed: MetaAddr = bytes.as_slice().thunderbolt_deserialize_into().unwrap();
        assert_eq!(addr, parsed);
    }
}
