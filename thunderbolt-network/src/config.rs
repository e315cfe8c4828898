//! Networking configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

use thunderbolt_chain::parameters::Network;

/// Configuration for the peer-to-peer layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The address to listen on for inbound connections.
    pub listen_addr: SocketAddr,

    /// The network to connect to.
    pub network: Network,

    /// Seed peers dialed when the address pool has nothing better.
    pub initial_peers: Vec<SocketAddr>,

    /// How many outbound connections to maintain.
    pub target_outbound_peers: usize,

    /// Where the address pool is persisted. `None` keeps it in memory.
    pub address_book_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            listen_addr: "0.0.0.0:8533".parse().expect("hard-coded address parses"),
            network: Network::Mainnet,
            initial_peers: Vec::new(),
            target_outbound_peers: 8,
            address_book_path: None,
        }
    }
}
