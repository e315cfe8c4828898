use std::net::SocketAddr;

use chrono::{DateTime, TimeZone, Utc};
use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};

use thunderbolt_chain::{
    block, SerializationError, ThunderboltDeserialize, ThunderboltSerialize,
};

use super::super::types::{Nonce, PeerServices, ProtocolVersion};

/// A `version` message.
///
/// Sent by both sides to open a connection; carries everything a peer
/// needs to decide whether to keep talking to us.
#[derive(Clone, PartialEq, Eq, Debug, TbSerialize, TbDeserialize)]
pub struct Version {
    /// The network protocol version supported by the sender.
    pub version: ProtocolVersion,

    /// The network services advertised by the sender.
    pub services: PeerServices,

    /// The time when the version message was sent.
    pub timestamp: DateTime<Utc>,

    /// The network address of the node receiving this message, and its
    /// advertised network services, as seen by the sender.
    pub address_recv: (PeerServices, SocketAddr),

    /// The network address of the node sending this message, and its
    /// advertised network services.
    pub address_from: (PeerServices, SocketAddr),

    /// Node random nonce, randomly generated every time a version
    /// packet is sent. This nonce is used to detect connections
    /// to self.
    pub nonce: Nonce,

    /// The user agent advertised by the sender.
    pub user_agent: String,

    /// The height of the best block known to the sender.
    pub start_height: block::Height,

    /// Whether the remote peer should announce relayed transactions.
    pub relay: bool,
}

impl Version {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        version: ProtocolVersion,
        their_addr: SocketAddr,
        their_services: PeerServices,
        our_services: PeerServices,
        our_addr: SocketAddr,
        nonce: Nonce,
        user_agent: String,
        start_height: block::Height,
        relay: bool,
    ) -> Version {
        // Truncate the timestamp to the nearest 5 minutes, to stay
        // within the range where peers ignore our clock skew.
        let now = Utc::now().timestamp();
        let timestamp = Utc.timestamp(now - now.rem_euclid(5 * 60), 0);
        Version {
            version,
            services: our_services,
            timestamp,
            address_recv: (their_services, their_addr),
            address_from: (our_services, our_addr),
            nonce,
            user_agent,
            start_height,
            relay,
        }
    }
}
