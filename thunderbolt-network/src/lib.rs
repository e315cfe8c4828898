//! Peer-to-peer networking for Thunderbolt.
//!
//! Framing and message types live under [`protocol`]; per-connection
//! state under [`peer`]; the address pool under [`address_book`]; and
//! the single control task that owns all of them — dispatch, relay,
//! ban policy, dialing, and initial block download — in [`peer_set`].

#[macro_use]
extern crate serde;

pub mod address_book;
pub mod config;
pub mod constants;
pub mod meta_addr;
pub mod peer;
pub mod peer_set;
pub mod protocol;
pub mod sync;

pub use address_book::AddressBook;
pub use config::Config;
pub use meta_addr::MetaAddr;
pub use peer_set::{init, PeerInfo, PeerSetHandle};
pub use protocol::external::Message;
