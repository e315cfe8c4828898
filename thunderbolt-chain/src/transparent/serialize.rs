//! Wire serialization for inputs.
//!
//! Coinbase inputs share the outpoint layout with regular inputs: a
//! zero transaction id and an index of `u32::MAX` mark the coinbase,
//! and its unlocking parameters carry the block height followed by free
//! data. The enum variant is reconstructed from that marker on read.

use std::io::{self, Read};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::serialization::{SerializationError, ThunderboltDeserialize, ThunderboltSerialize};
use crate::{block, transaction};

use super::{CoinbaseData, Input, OutPoint};

impl ThunderboltSerialize for Input {
    fn thunderbolt_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        match self {
            Input::PrevOut {
                outpoint,
                unlock_script,
            } => {
                outpoint.thunderbolt_serialize(&mut writer)?;
                unlock_script.thunderbolt_serialize(&mut writer)?;
            }
            Input::Coinbase { height, data } => {
                transaction::Hash::ZERO.thunderbolt_serialize(&mut writer)?;
                u32::MAX.thunderbolt_serialize(&mut writer)?;
                // Unlocking parameters: height, then free data, as one
                // length-prefixed blob.
                writer.write_u32::<LittleEndian>((8 + data.0.len()) as u32)?;
                writer.write_u64::<LittleEndian>(height.0)?;
                writer.write_all(&data.0)?;
            }
        }
        Ok(())
    }
}

impl ThunderboltDeserialize for Input {
    fn thunderbolt_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let outpoint = OutPoint::thunderbolt_deserialize(&mut reader)?;

        if outpoint.is_null() {
            let len = reader.read_u32::<LittleEndian>()? as usize;
            if len < 8 {
                return Err(SerializationError::Parse(
                    "coinbase unlocking parameters too short to hold a height",
                ));
            }
            if len > 8 + CoinbaseData::MAX_LEN {
                return Err(SerializationError::Parse(
                    "coinbase unlocking parameters too long",
                ));
            }
            let height = block::Height(reader.read_u64::<LittleEndian>()?);
            let mut data = vec![0u8; len - 8];
            reader.read_exact(&mut data)?;
            Ok(Input::Coinbase {
                height,
                data: CoinbaseData(data),
            })
        } else {
            Ok(Input::PrevOut {
                outpoint,
                unlock_script: super::Script::thunderbolt_deserialize(&mut reader)?,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparent::Script;
    use crate::ThunderboltDeserializeInto;

    #[test]
    fn coinbase_input_roundtrip() {
        let input = Input::Coinbase {
            height: block::Height(17),
            data: CoinbaseData(b"free data".to_vec()),
        };

        let bytes = input.thunderbolt_serialize_to_vec().unwrap();
        let parsed: Input = bytes.as_slice().thunderbolt_deserialize_into().unwrap();

        assert_eq!(input, parsed);
    }

    #[test]
    fn prevout_input_roundtrip() {
        let input = Input::PrevOut {
            outpoint: OutPoint {
                tx_id: transaction::Hash([0xabu8; 32]),
                index: 3,
            },
            unlock_script: Script(vec![1, 2, 3, 4]),
        };

        let bytes = input.thunderbolt_serialize_to_vec().unwrap();
        let parsed: Input = bytes.as_slice().thunderbolt_deserialize_into().unwrap();

        assert_eq!(input, parsed);
    }

    #[test]
    fn oversized_coinbase_data_is_rejected() {
        let mut bytes = Vec::new();
        transaction::Hash::ZERO
            .thunderbolt_serialize(&mut bytes)
            .unwrap();
        u32::MAX.thunderbolt_serialize(&mut bytes).unwrap();
        let blob_len = (8 + CoinbaseData::MAX_LEN + 1) as u32;
        blob_len.thunderbolt_serialize(&mut bytes).unwrap();
        bytes.extend(std::iter::repeat(0u8).take(blob_len as usize));

        assert!(bytes
            .as_slice()
            .thunderbolt_deserialize_into::<Input>()
            .is_err());
    }
}
