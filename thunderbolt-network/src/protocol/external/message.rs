//! Definitions of network messages.

use std::fmt;
use std::sync::Arc;

use thunderbolt_chain::{
    block::{self, Block},
    transaction::Transaction,
};

use super::inv::InventoryHash;
use super::types::Nonce;
use super::Command;
use crate::meta_addr::MetaAddr;

mod get_blocks;
mod get_headers;
mod version;

pub use get_blocks::GetBlocks;
pub use get_headers::GetHeaders;
pub use version::Version;

/// A network message.
///
/// This enum is the internal representation; the 12-byte ASCII command
/// string and the envelope around the payload are a serialization
/// detail handled by the codec. (As a side benefit, that means there is
/// a clearly-defined validation boundary for network messages during
/// serialization.)
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum Message {
    /// A `version` message.
    ///
    /// Despite the name, its role is really analogous to a
    /// `ClientHello` in TLS: it begins the handshake, and is distinct
    /// from a simple version number.
    Version(Version),

    /// A `verack` message: the handshake acknowledgement.
    Verack,

    /// A `ping` message, carrying a nonce unique to this ping.
    Ping(Nonce),

    /// A `pong` message, echoing the nonce of a prior `ping`.
    Pong(Nonce),

    /// A `getaddr` message: solicit the peer's known addresses.
    GetAddr,

    /// An `addr` message: a gossip batch of timestamped addresses.
    Addr(Vec<MetaAddr>),

    /// A `getblocks` message.
    ///
    /// The locator is a series of known block hashes spaced out along
    /// the sender's best chain, newest first. The receiver computes the
    /// intersection with its own best chain and replies with an `inv`
    /// of the blocks that follow, up to 500.
    GetBlocks(GetBlocks),

    /// An `inv` message: advertise knowledge of one or more objects,
    /// unsolicited or in reply to `getblocks`.
    Inv(Vec<InventoryHash>),

    /// A `getheaders` message: like `getblocks`, but the reply is a
    /// `headers` batch of up to 2000 headers.
    GetHeaders(GetHeaders),

    /// A `headers` message, each header paired with its block's
    /// transaction count.
    Headers(Vec<block::CountedHeader>),

    /// A `getdata` message, fetching the content of advertised objects.
    GetData(Vec<InventoryHash>),

    /// A `block` message: one full serialized block.
    Block(Arc<Block>),

    /// A `tx` message: one full serialized transaction.
    Tx(Arc<Transaction>),

    /// A `notfound` message, listing `getdata` entries we couldn't serve.
    NotFound(Vec<InventoryHash>),

    /// A `mempool` message: solicit an `inv` of pending transactions.
    Mempool,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Message::Version { .. } => "version",
            Message::Verack => "verack",
            Message::Ping(_) => "ping",
            Message::Pong(_) => "pong",
            Message::GetAddr => "getaddr",
            Message::Addr(_) => "addr",
            Message::GetBlocks { .. } => "getblocks",
            Message::Inv(_) => "inv",
            Message::GetHeaders { .. } => "getheaders",
            Message::Headers(_) => "headers",
            Message::GetData(_) => "getdata",
            Message::Block(_) => "block",
            Message::Tx(_) => "tx",
            Message::NotFound(_) => "notfound",
            Message::Mempool => "mempool",
        })
    }
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Version { .. } => Command::Version,
            Message::Verack => Command::Verack,
            Message::Ping { .. } => Command::Ping,
            Message::Pong { .. } => Command::Pong,
            Message::GetAddr => Command::GetAddr,
            Message::Addr { .. } => Command::Addr,
            Message::GetBlocks { .. } => Command::GetBlocks,
            Message::Inv { .. } => Command::Inv,
            Message::GetHeaders { .. } => Command::GetHeaders,
            Message::Headers { .. } => Command::Headers,
            Message::GetData { .. } => Command::GetData,
            Message::Block { .. } => Command::Block,
            Message::Tx { .. } => Command::Tx,
            Message::NotFound { .. } => Command::NotFound,
            Message::Mempool => Command::MemPool,
        }
    }
}
