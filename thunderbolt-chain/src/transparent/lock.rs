//! Output locks: the closed set of conditions under which an output may
//! be spent. Dispatch is by tag; there is no script machine.

use std::{fmt, io};

use ripemd160::{Digest, Ripemd160};
use sha2::{Digest as sha2Digest, Sha256};

use crate::serialization::{
    sha256d, SerializationError, ThunderboltDeserialize, ThunderboltSerialize,
};
use thunderbolt_serde_derive::{TbDeserialize, TbSerialize};

use super::{AddressHash, Script};

/// The kind of condition guarding an output.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LockKind {
    /// A single ECDSA signature against the embedded public key.
    SingleSig,
    /// `k` of `n` signatures against a committed key set.
    MultiSig,
    /// No unlocking parameters exist; spending always fails. Used to
    /// burn value (the genesis subsidy, for one).
    Unlockable,
}

impl LockKind {
    pub fn tag(&self) -> u8 {
        match self {
            LockKind::SingleSig => 0,
            LockKind::MultiSig => 1,
            LockKind::Unlockable => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Option<LockKind> {
        match tag {
            0 => Some(LockKind::SingleSig),
            1 => Some(LockKind::MultiSig),
            2 => Some(LockKind::Unlockable),
            _ => None,
        }
    }
}

/// A lock kind with its parameters.
///
/// For `SingleSig` the parameters are a serialized secp256k1 public
/// key. For `MultiSig` they are the 32-byte commitment produced by
/// [`multisig_commitment`]. `Unlockable` carries whatever bytes the
/// creator chose to tag the burn with (usually none).
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct LockScript {
    pub kind: LockKind,
    pub params: Script,
}

impl LockScript {
    pub fn single_sig(public_key: Vec<u8>) -> LockScript {
        LockScript {
            kind: LockKind::SingleSig,
            params: Script(public_key),
        }
    }

    pub fn multi_sig(required: u8, keys: &[CompressedPublicKey]) -> LockScript {
        LockScript {
            kind: LockKind::MultiSig,
            params: Script(multisig_commitment(required, keys).to_vec()),
        }
    }

    pub fn unlockable() -> LockScript {
        LockScript {
            kind: LockKind::Unlockable,
            params: Script(Vec::new()),
        }
    }

    pub fn serialized_size(&self) -> usize {
        1 + self.params.serialized_size()
    }

    /// The address hash for the per-address index: a RIPEMD160-SHA256
    /// over the locking parameters. For single-signature locks this is
    /// exactly the public key hash that base58check addresses encode.
    pub fn address_hash(&self) -> Option<AddressHash> {
        match self.kind {
            LockKind::Unlockable => None,
            LockKind::SingleSig | LockKind::MultiSig => {
                let sha = Sha256::digest(&self.params.0);
                let ripe = Ripemd160::digest(&sha);
                let mut hash = [0u8; 20];
                hash.copy_from_slice(&ripe);
                Some(AddressHash(hash))
            }
        }
    }
}

impl fmt::Debug for LockScript {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("LockScript")
            .field("kind", &self.kind)
            .field("params", &self.params)
            .finish()
    }
}

impl ThunderboltSerialize for LockScript {
    fn thunderbolt_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.kind.tag().thunderbolt_serialize(&mut writer)?;
        self.params.thunderbolt_serialize(&mut writer)
    }
}

impl ThunderboltDeserialize for LockScript {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let tag = u8::thunderbolt_deserialize(&mut reader)?;
        let kind =
            LockKind::from_tag(tag).ok_or(SerializationError::Parse("unknown lock kind tag"))?;
        Ok(LockScript {
            kind,
            params: Script::thunderbolt_deserialize(&mut reader)?,
        })
    }
}

/// A 33-byte compressed secp256k1 public key, as committed to by
/// multi-signature locks.
#[derive(Copy, Clone, Eq, PartialEq, Hash, TbSerialize, TbDeserialize)]
pub struct CompressedPublicKey(pub [u8; 33]);

impl fmt::Debug for CompressedPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompressedPublicKey")
            .field(&hex::encode(&self.0[..]))
            .finish()
    }
}

/// A 64-byte compact ECDSA signature.
#[derive(Copy, Clone, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct SignatureBytes(pub [u8; 64]);

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("SignatureBytes")
            .field(&hex::encode(&self.0[..]))
            .finish()
    }
}

/// A signature paired with the index of the committed key it claims to
/// satisfy.
#[derive(Copy, Clone, Debug, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct KeyedSignature {
    pub key_index: u8,
    pub signature: SignatureBytes,
}

/// The unlocking parameters of a multi-signature input: the full key
/// set the output committed to, plus `required` distinct signatures.
#[derive(Clone, Debug, Eq, PartialEq, TbSerialize, TbDeserialize)]
pub struct MultiSigUnlock {
    /// How many distinct keys must have signed.
    pub required: u8,
    /// The committed key set, in commitment order.
    pub keys: Vec<CompressedPublicKey>,
    /// The provided signatures, keyed by index into `keys`.
    pub signatures: Vec<KeyedSignature>,
}

impl MultiSigUnlock {
    /// The commitment the spent output's locking parameters must equal.
    pub fn locking_commitment(&self) -> [u8; 32] {
        multisig_commitment(self.required, &self.keys)
    }
}

/// The 32-byte commitment a multi-signature output locks to:
/// `sha256d(required || keys)`.
pub fn multisig_commitment(required: u8, keys: &[CompressedPublicKey]) -> [u8; 32] {
    let mut data = Vec::with_capacity(1 + 4 + keys.len() * 33);
    required
        .thunderbolt_serialize(&mut data)
        .expect("serializing to a Vec is infallible");
    keys.to_vec()
        .thunderbolt_serialize(&mut data)
        .expect("serializing to a Vec is infallible");
    sha256d::digest(&data)
}
