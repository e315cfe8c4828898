//! Value-transfer building blocks: outpoints, inputs, outputs, locks.
#![allow(clippy::unit_arg)]

mod address;
mod lock;
mod script;
mod serialize;

pub use address::{Address, AddressHash, ToAddressWithNetwork};
pub use lock::{
    multisig_commitment, CompressedPublicKey, KeyedSignature, LockKind, LockScript, MultiSigUnlock,
    SignatureBytes,
};
pub use script::Script;

use crate::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};
use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

use crate::{
    amount::{Amount, NonNegative},
    block, transaction,
};

/// Arbitrary data inserted by miners into a coinbase transaction,
/// following the encoded block height.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct CoinbaseData(
    /// Invariant: this vec must hold at most [`CoinbaseData::MAX_LEN`]
    /// bytes. The constructor and the deserializer both enforce it.
    pub(super) Vec<u8>,
);

impl CoinbaseData {
    /// The most free data a coinbase input may carry, once the 8-byte
    /// height is accounted for.
    pub const MAX_LEN: usize = 92;

    pub fn new(data: Vec<u8>) -> Option<CoinbaseData> {
        if data.len() > Self::MAX_LEN {
            return None;
        }
        Some(CoinbaseData(data))
    }
}

impl AsRef<[u8]> for CoinbaseData {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl std::fmt::Debug for CoinbaseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let escaped = String::from_utf8(
            self.0
                .iter()
                .cloned()
                .flat_map(std::ascii::escape_default)
                .collect(),
        )
        .expect("ascii::escape_default produces utf8");
        f.debug_tuple("CoinbaseData").field(&escaped).finish()
    }
}

/// OutPoint
///
/// A particular transaction output reference.
#[derive(
    Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, TbSerialize, TbDeserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub tx_id: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// The null outpoint is the coinbase marker: a zero transaction id
    /// and the maximum index.
    pub fn is_null(&self) -> bool {
        self.tx_id.is_zero() && self.index == u32::MAX
    }
}

/// A transaction input.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Input {
    /// A reference to an output of a previous transaction.
    PrevOut {
        /// The previous output transaction reference.
        outpoint: OutPoint,
        /// The unlocking parameters that satisfy `outpoint`'s lock.
        unlock_script: Script,
    },
    /// New coins created by the block reward.
    Coinbase {
        /// The height of the block this coinbase is for, encoded as the
        /// first eight bytes of the input's unlocking parameters. Ties
        /// a coinbase to its block so identical rewards hash apart.
        height: block::Height,
        /// Free data inserted by miners.
        data: CoinbaseData,
    },
}

impl Input {
    /// The length of this input when serialized, in bytes.
    pub fn serialized_size(&self) -> usize {
        match self {
            Input::PrevOut {
                ref unlock_script, ..
            } => OutPoint::len() + unlock_script.serialized_size(),
            Input::Coinbase { ref data, .. } => OutPoint::len() + 4 + 8 + data.0.len(),
        }
    }

    /// The outpoint spent by this input, unless it is a coinbase.
    pub fn outpoint(&self) -> Option<OutPoint> {
        match self {
            Input::PrevOut { outpoint, .. } => Some(*outpoint),
            Input::Coinbase { .. } => None,
        }
    }
}

/// A transaction output.
///
/// The most fundamental building block of a transaction is an output --
/// the coins you own are in fact a subset of the unspent transaction
/// outputs (the "UTXO"s) of the global ledger. UTXOs are indivisible,
/// discrete units of value which can only be consumed in their
/// entirety.
#[derive(
    Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash, TbSerialize, TbDeserialize,
)]
pub struct Output {
    /// Transaction value.
    pub value: Amount<NonNegative>,

    /// The lock defines the conditions under which this output can be spent.
    pub lock_script: LockScript,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output
    pub fn serialized_size(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }

    /// The 20-byte address hash this output pays to, if its lock kind
    /// has one. Keys the per-address UTXO index.
    pub fn address_hash(&self) -> Option<AddressHash> {
        self.lock_script.address_hash()
    }
}
