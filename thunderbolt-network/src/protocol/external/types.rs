//! Newtype wrappers for the primitive types that cross the wire.

use bitflags::bitflags;
use rand::{thread_rng, Rng};

use thunderbolt_chain::{
    parameters::Network, SerializationError, ThunderboltDeserialize, ThunderboltSerialize,
};

/// The network magic prefixing every message envelope.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Magic(pub [u8; 4]);

impl std::fmt::Debug for Magic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Magic").field(&hex::encode(&self.0)).finish()
    }
}

impl From<Network> for Magic {
    /// Get the magic value associated to the `Network`.
    fn from(network: Network) -> Self {
        match network {
            Network::Mainnet => Magic([0xf9, 0x74, 0x62, 0x74]),
            Network::Testnet => Magic([0x0b, 0x74, 0x62, 0x74]),
        }
    }
}

/// A protocol version number.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ProtocolVersion(pub u32);

impl ThunderboltSerialize for ProtocolVersion {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.thunderbolt_serialize(target)
    }
}

impl ThunderboltDeserialize for ProtocolVersion {
    fn thunderbolt_deserialize<R: std::io::Read>(
        reader: R,
    ) -> Result<Self, SerializationError> {
        Ok(ProtocolVersion(u32::thunderbolt_deserialize(reader)?))
    }
}

/// A nonce used in the networking layer to identify messages.
///
/// Each `version` message carries a fresh one so a node can notice it
/// has connected to itself, and each `ping` carries one so the matching
/// `pong` can be verified.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Nonce(pub u64);

impl Default for Nonce {
    fn default() -> Self {
        let mut rng = thread_rng();
        Self(rng.gen())
    }
}

impl ThunderboltSerialize for Nonce {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.thunderbolt_serialize(target)
    }
}

impl ThunderboltDeserialize for Nonce {
    fn thunderbolt_deserialize<R: std::io::Read>(
        reader: R,
    ) -> Result<Self, SerializationError> {
        Ok(Nonce(u64::thunderbolt_deserialize(reader)?))
    }
}

bitflags! {
    /// The services advertised by a node.
    #[derive(Default)]
    pub struct PeerServices: u64 {
        /// NODE_NETWORK means this node can serve full blocks.
        const NODE_NETWORK = 1;
    }
}

impl ThunderboltSerialize for PeerServices {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.bits().thunderbolt_serialize(target)
    }
}

impl ThunderboltDeserialize for PeerServices {
    fn thunderbolt_deserialize<R: std::io::Read>(
        reader: R,
    ) -> Result<Self, SerializationError> {
        // Unknown service bits from newer peers are kept, not rejected.
        Ok(PeerServices::from_bits_truncate(u64::thunderbolt_deserialize(reader)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn networks_have_distinct_magics() {
        assert_ne!(Magic::from(Network::Mainnet), Magic::from(Network::Testnet));
    }

    #[test]
    fn fresh_nonces_differ() {
        assert_ne!(Nonce::default(), Nonce::default());
    }
}
