#![allow(clippy::unit_arg)]
use crate::serialization::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};
use std::{fmt, io};

/// An opaque byte string carried by an input to satisfy an output's lock.
///
/// For single-signature locks this is a 64-byte compact signature; for
/// multi-signature locks it is a serialized [`super::MultiSigUnlock`].
/// The transaction layer treats it as bytes; only contextual validation
/// interprets it.
#[derive(Clone, Eq, PartialEq, Serialize, Deserialize, Hash, Default)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn serialized_size(&self) -> usize {
        4 + self.0.len()
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl ThunderboltSerialize for Script {
    fn thunderbolt_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.thunderbolt_serialize(writer)
    }
}

impl ThunderboltDeserialize for Script {
    fn thunderbolt_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Script(Vec::<u8>::thunderbolt_deserialize(reader)?))
    }
}

#[cfg(test)]
mod proptests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;
    use crate::serialization::{ThunderboltDeserialize, ThunderboltSerialize};

    proptest! {
        #[test]
        fn script_roundtrip(script in any::<Script>()) {
            thunderbolt_test::init();

            let mut bytes = Cursor::new(Vec::new());
            script.thunderbolt_serialize(&mut bytes)?;

            bytes.set_position(0);
            let other_script = Script::thunderbolt_deserialize(&mut bytes)?;

            prop_assert_eq![script, other_script];
        }
    }
}
