//! Consensus-critical data structures for Thunderbolt.
//!
//! This crate defines the types that appear on the wire and on disk —
//! blocks, transactions, amounts, difficulty encodings — together with
//! their canonical serialization. Everything that hashes or signs goes
//! through the codec in [`serialization`], so the byte layout in this
//! crate *is* the consensus format.

#![allow(clippy::unit_arg)]

#[macro_use]
extern crate serde;

pub mod amount;
pub mod block;
pub mod cached;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use cached::Cached;
pub use serialization::{
    SerializationError, ThunderboltDeserialize, ThunderboltDeserializeInto, ThunderboltSerialize,
};
