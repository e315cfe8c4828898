use crate::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};

#[cfg(any(test, feature = "proptest-impl"))]
use proptest_derive::Arbitrary;

/// The length of the chain back to the genesis block, which is height 0.
#[derive(
    Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize,
)]
#[cfg_attr(any(test, feature = "proptest-impl"), derive(Arbitrary))]
pub struct Height(pub u64);

impl std::fmt::Display for Height {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl ThunderboltSerialize for Height {
    fn thunderbolt_serialize<W: std::io::Write>(&self, target: W) -> Result<(), std::io::Error> {
        self.0.thunderbolt_serialize(target)
    }
}

impl ThunderboltDeserialize for Height {
    fn thunderbolt_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Height(u64::thunderbolt_deserialize(reader)?))
    }
}
