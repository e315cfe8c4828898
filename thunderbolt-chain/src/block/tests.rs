use std::io::ErrorKind;
use std::sync::Arc;

use proptest::prelude::*;

use super::*;
use crate::serialization::{
    SerializationError, ThunderboltDeserializeInto, ThunderboltSerialize,
};
use crate::transaction::tests::transaction_strategy;
use crate::work::difficulty::CompactDifficulty;

pub(crate) fn header_strategy() -> impl Strategy<Value = Header> {
    (
        any::<u32>(),
        any::<[u8; 32]>(),
        any::<[u8; 32]>(),
        any::<u64>(),
        any::<u32>(),
        any::<u64>(),
    )
        .prop_map(|(version, parent, root, timestamp, bits, nonce)| {
            Header::new(
                version,
                Hash(parent),
                merkle::Root(root),
                timestamp,
                CompactDifficulty(bits),
                nonce,
            )
        })
}

fn block_strategy() -> impl Strategy<Value = Block> {
    (
        header_strategy(),
        proptest::collection::vec(transaction_strategy(), 1..4),
    )
        .prop_map(|(header, transactions)| Block {
            header,
            transactions: transactions.into_iter().map(Arc::new).collect(),
        })
}

proptest! {
    #[test]
    fn block_hash_roundtrip(hash in any::<Hash>()) {
        thunderbolt_test::init();

        let bytes = hash.thunderbolt_serialize_to_vec()?;
        let other_hash: Hash = bytes.as_slice().thunderbolt_deserialize_into()?;

        prop_assert_eq![hash, other_hash];
    }

    #[test]
    fn block_hash_display_fromstr_roundtrip(hash in any::<Hash>()) {
        thunderbolt_test::init();

        let display = format!("{}", hash);
        let parsed = display.parse::<Hash>().expect("hash should parse");
        prop_assert_eq!(hash, parsed);
    }
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(512))]

    #[test]
    fn blockheader_roundtrip(header in header_strategy()) {
        thunderbolt_test::init();

        let bytes = header.thunderbolt_serialize_to_vec().unwrap();
        prop_assert_eq![bytes.len(), Header::len()];

        let other_header: Header = bytes.as_slice().thunderbolt_deserialize_into()?;

        prop_assert_eq![header, other_header];
        // The deserializer stamps the hash cache from the raw bytes; it
        // must agree with a hash computed by re-serializing.
        prop_assert_eq![header.hash(), other_header.hash()];
    }
}

proptest! {
    // The block roundtrip test can be slow, so we use fewer cases by default.
    #![proptest_config(proptest::test_runner::Config::with_cases(32))]

    #[test]
    fn block_roundtrip(block in block_strategy()) {
        thunderbolt_test::init();
        let bytes = block.thunderbolt_serialize_to_vec()?;
        let bytes = &mut bytes.as_slice();

        // Check the block size limit
        if bytes.len() <= MAX_BLOCK_BYTES as _ {
            let other_block: Block = bytes.thunderbolt_deserialize_into()?;

            prop_assert_eq![block, other_block];
        } else {
            let serialization_err = bytes.thunderbolt_deserialize_into::<Block>()
                .expect_err("blocks larger than the maximum size should fail");
            match serialization_err {
                SerializationError::Io(io_err) => {
                    prop_assert_eq![io_err.kind(), ErrorKind::UnexpectedEof];
                }
                _ => {
                    prop_assert!(false,
                                 "blocks larger than the maximum size should fail with an io::Error");
                }
            }
        }
    }
}

#[test]
fn coinbase_height_comes_from_first_input() {
    thunderbolt_test::init();

    let genesis = crate::parameters::genesis_block(crate::parameters::Network::Testnet);
    assert_eq!(genesis.coinbase_height(), Some(Height(0)));
}
