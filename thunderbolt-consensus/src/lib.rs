//! Consensus validation and the chain state machine for Thunderbolt.
//!
//! This crate owns the rules: context-free and contextual checks for
//! blocks and transactions, the retarget schedule, the subsidy
//! schedule, the mempool, and the [`chain::ChainEngine`] that decides
//! what the active chain is. The engine is the single chain-mutation
//! owner; everything else reaches it through the actor in [`service`].

pub mod block;
pub mod chain;
pub mod difficulty;
pub mod error;
pub mod mempool;
pub mod miner;
pub mod parameters;
pub mod service;
pub mod subsidy;
pub mod transaction;

pub use chain::{AcceptOutcome, ChainEngine, ChainEvent, ChainListener};
pub use error::{BlockError, InvalidKind, SubsidyError, TransactionError};
pub use mempool::{Mempool, MempoolInsertOutcome};
pub use service::{ChainHandle, Request, Response};
