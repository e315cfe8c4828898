//! Wallet-facing address types.

use std::{fmt, io};

use ripemd160::{Digest, Ripemd160};
use secp256k1::PublicKey;
use sha2::{Digest as sha2Digest, Sha256};

#[cfg(test)]
use proptest::{arbitrary::Arbitrary, collection::vec, prelude::*};

use crate::{
    parameters::Network,
    serialization::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize},
};

use super::LockScript;

/// Magic numbers used to identify what networks addresses belong to.
mod magics {
    pub mod p2sh {
        pub const MAINNET: [u8; 1] = [0x05];
        pub const TESTNET: [u8; 1] = [0xc4];
    }

    pub mod p2pkh {
        pub const MAINNET: [u8; 1] = [0x00];
        pub const TESTNET: [u8; 1] = [0x6f];
    }
}

/// The RIPEMD160-of-SHA256 hash that keys the per-address UTXO index
/// and forms the payload of every address.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct AddressHash(pub [u8; 20]);

impl AddressHash {
    /// Hash an arbitrary payload (a public key, a multisig commitment)
    /// down to the 20-byte index form.
    pub fn hash_payload(bytes: &[u8]) -> AddressHash {
        let sha_hash = Sha256::digest(bytes);
        let ripe_hash = Ripemd160::digest(&sha_hash);
        let mut payload = [0u8; 20];
        payload[..].copy_from_slice(&ripe_hash[..]);
        AddressHash(payload)
    }
}

impl fmt::Debug for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("AddressHash")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl ThunderboltSerialize for AddressHash {
    fn thunderbolt_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl ThunderboltDeserialize for AddressHash {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(AddressHash(<[u8; 20]>::thunderbolt_deserialize(
            &mut reader,
        )?))
    }
}

/// Addresses
///
/// A single byte is prepended to the address hash to specify the
/// address type, and the result is Base58Check encoded.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum Address {
    /// An address holding a hash of a multi-signature commitment.
    PayToScriptHash {
        /// Production, test, or other network
        network: Network,
        /// The hash of the multisig commitment.
        script_hash: AddressHash,
    },
    /// An address holding a public key hash, which is a RIPEMD-160
    /// hash of a SHA-256 hash of an ECDSA key encoding.
    PayToPublicKeyHash {
        /// Production, test, or other network
        network: Network,
        /// The public key hash.
        pub_key_hash: AddressHash,
    },
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut debug_struct = f.debug_struct("Address");

        match self {
            Address::PayToScriptHash {
                network,
                script_hash,
            } => debug_struct
                .field("network", network)
                .field("script_hash", &hex::encode(script_hash.0))
                .finish(),
            Address::PayToPublicKeyHash {
                network,
                pub_key_hash,
            } => debug_struct
                .field("network", network)
                .field("pub_key_hash", &hex::encode(pub_key_hash.0))
                .finish(),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut bytes = io::Cursor::new(Vec::new());
        let _ = self.thunderbolt_serialize(&mut bytes);

        f.write_str(&bs58::encode(bytes.get_ref()).with_check().into_string())
    }
}

impl std::str::FromStr for Address {
    type Err = SerializationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = &bs58::decode(s).with_check(None).into_vec();

        match result {
            Ok(bytes) => Self::thunderbolt_deserialize(&bytes[..]),
            Err(_) => Err(SerializationError::Parse("address decoding error")),
        }
    }
}

impl ThunderboltSerialize for Address {
    fn thunderbolt_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Address::PayToScriptHash {
                network,
                script_hash,
            } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2sh::MAINNET[..])?,
                    _ => writer.write_all(&magics::p2sh::TESTNET[..])?,
                }
                writer.write_all(&script_hash.0)?
            }
            Address::PayToPublicKeyHash {
                network,
                pub_key_hash,
            } => {
                match *network {
                    Network::Mainnet => writer.write_all(&magics::p2pkh::MAINNET[..])?,
                    _ => writer.write_all(&magics::p2pkh::TESTNET[..])?,
                }
                writer.write_all(&pub_key_hash.0)?
            }
        }

        Ok(())
    }
}

impl ThunderboltDeserialize for Address {
    fn thunderbolt_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut version_bytes = [0; 1];
        reader.read_exact(&mut version_bytes)?;

        let mut hash_bytes = [0; 20];
        reader.read_exact(&mut hash_bytes)?;

        match version_bytes {
            magics::p2sh::MAINNET => Ok(Address::PayToScriptHash {
                network: Network::Mainnet,
                script_hash: AddressHash(hash_bytes),
            }),
            magics::p2sh::TESTNET => Ok(Address::PayToScriptHash {
                network: Network::Testnet,
                script_hash: AddressHash(hash_bytes),
            }),
            magics::p2pkh::MAINNET => Ok(Address::PayToPublicKeyHash {
                network: Network::Mainnet,
                pub_key_hash: AddressHash(hash_bytes),
            }),
            magics::p2pkh::TESTNET => Ok(Address::PayToPublicKeyHash {
                network: Network::Testnet,
                pub_key_hash: AddressHash(hash_bytes),
            }),
            _ => Err(SerializationError::Parse("bad addr version/type")),
        }
    }
}

impl Address {
    /// The address hash inside this address, whatever its type.
    pub fn hash(&self) -> AddressHash {
        match self {
            Address::PayToScriptHash { script_hash, .. } => *script_hash,
            Address::PayToPublicKeyHash { pub_key_hash, .. } => *pub_key_hash,
        }
    }

    /// The lock script paying to this address, for single-key addresses.
    ///
    /// Note that an address alone cannot reconstruct a lock: locks embed
    /// the full key or commitment, addresses only their hash. The miner
    /// configuration therefore carries a full key, and this helper exists
    /// for the test suite and the wallet seam.
    pub fn network(&self) -> Network {
        match self {
            Address::PayToScriptHash { network, .. } => *network,
            Address::PayToPublicKeyHash { network, .. } => *network,
        }
    }
}

/// Convert `self` to an `Address`, given the current `network`.
pub trait ToAddressWithNetwork {
    fn to_address(&self, network: Network) -> Address;
}

impl ToAddressWithNetwork for PublicKey {
    fn to_address(&self, network: Network) -> Address {
        Address::PayToPublicKeyHash {
            network,
            pub_key_hash: AddressHash::hash_payload(&self.serialize()[..]),
        }
    }
}

impl ToAddressWithNetwork for LockScript {
    fn to_address(&self, network: Network) -> Address {
        match self.address_hash() {
            Some(hash) => match self.kind {
                super::LockKind::MultiSig => Address::PayToScriptHash {
                    network,
                    script_hash: hash,
                },
                _ => Address::PayToPublicKeyHash {
                    network,
                    pub_key_hash: hash,
                },
            },
            None => Address::PayToPublicKeyHash {
                network,
                pub_key_hash: AddressHash([0u8; 20]),
            },
        }
    }
}

#[cfg(test)]
impl Address {
    fn p2pkh_strategy() -> impl Strategy<Value = Self> {
        (any::<Network>(), vec(any::<u8>(), 20))
            .prop_map(|(network, payload_bytes)| {
                let mut bytes = [0; 20];
                bytes.copy_from_slice(payload_bytes.as_slice());
                Self::PayToPublicKeyHash {
                    network,
                    pub_key_hash: AddressHash(bytes),
                }
            })
            .boxed()
    }

    fn p2sh_strategy() -> impl Strategy<Value = Self> {
        (any::<Network>(), vec(any::<u8>(), 20))
            .prop_map(|(network, payload_bytes)| {
                let mut bytes = [0; 20];
                bytes.copy_from_slice(payload_bytes.as_slice());
                Self::PayToScriptHash {
                    network,
                    script_hash: AddressHash(bytes),
                }
            })
            .boxed()
    }
}

#[cfg(test)]
impl Arbitrary for Address {
    type Parameters = ();

    fn arbitrary_with(_args: Self::Parameters) -> Self::Strategy {
        prop_oneof![Self::p2pkh_strategy(), Self::p2sh_strategy()].boxed()
    }

    type Strategy = BoxedStrategy<Self>;
}


#[cfg(test)]
proptest! {

    #[test]
    fn address_roundtrip(addr in any::<Address>()) {
        thunderbolt_test::init();

        let mut data = Vec::new();

        addr.thunderbolt_serialize(&mut data).expect("addr should serialize");

        let addr2 = Address::thunderbolt_deserialize(&data[..]).expect("randomized addr should deserialize");

        prop_assert_eq![addr, addr2];
    }
}
