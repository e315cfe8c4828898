//! Persistent chain state for Thunderbolt.
//!
//! Two storage layers cooperate here:
//!
//! - segmented append-only log files hold serialized blocks and the
//!   revert records needed to disconnect them again, and
//! - a sled database indexes everything by hash: block metadata,
//!   transaction locations, the UTXO set with its per-address index,
//!   and the chain head.
//!
//! Writes that publish a block's effects go through a single sled
//! transaction, so observers never see a half-applied block.

mod config;
mod error;
mod log_store;
mod sled_state;
mod types;
pub mod util;

pub use config::Config;
pub use error::StorageError;
pub use log_store::{LogPointer, SegmentedLog};
pub use sled_state::{ChainWrite, FinalizedState};
pub use types::{BlockMetadata, BlockStatus, RevertRecord, TransactionLocation, Utxo};
