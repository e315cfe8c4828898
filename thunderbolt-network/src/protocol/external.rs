//! The messages exchanged with other nodes, and their wire framing.

pub mod codec;
pub mod command;
pub mod inv;
pub mod message;
pub mod types;

pub use codec::Codec;
pub use command::Command;
pub use inv::InventoryHash;
pub use message::{GetBlocks, GetHeaders, Message, Version};
