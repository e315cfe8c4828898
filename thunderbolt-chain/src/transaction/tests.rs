use proptest::prelude::*;

use super::*;
use crate::amount::Amount;
use crate::block::Height;
use crate::serialization::{ThunderboltDeserializeInto, ThunderboltSerialize};
use crate::transparent::{
    CoinbaseData, Input, LockKind, LockScript, OutPoint, Output, Script,
};

use std::convert::TryFrom;

pub(crate) fn input_strategy() -> impl Strategy<Value = Input> {
    prop_oneof![
        (
            any::<[u8; 32]>(),
            0u32..1000,
            proptest::collection::vec(any::<u8>(), 0..128),
        )
            .prop_map(|(tx_id, index, unlock)| {
                Input::PrevOut {
                    outpoint: OutPoint {
                        tx_id: Hash(tx_id),
                        index,
                    },
                    unlock_script: Script(unlock),
                }
            }),
        (
            any::<u64>(),
            proptest::collection::vec(any::<u8>(), 0..CoinbaseData::MAX_LEN),
        )
            .prop_map(|(height, data)| Input::Coinbase {
                height: Height(height),
                data: CoinbaseData::new(data).expect("bounded data fits"),
            }),
    ]
}

pub(crate) fn output_strategy() -> impl Strategy<Value = Output> {
    (
        0i64..crate::amount::MAX_MONEY,
        prop_oneof![
            Just(LockKind::SingleSig),
            Just(LockKind::MultiSig),
            Just(LockKind::Unlockable)
        ],
        proptest::collection::vec(any::<u8>(), 0..64),
    )
        .prop_map(|(value, kind, params)| Output {
            value: Amount::try_from(value).expect("strategy range is valid"),
            lock_script: LockScript {
                kind,
                params: Script(params),
            },
        })
}

pub(crate) fn transaction_strategy() -> impl Strategy<Value = Transaction> {
    (
        any::<u32>(),
        proptest::collection::vec(input_strategy(), 1..4),
        proptest::collection::vec(output_strategy(), 1..4),
        any::<u64>(),
    )
        .prop_map(|(version, inputs, outputs, lock_time)| {
            Transaction::new(version, inputs, outputs, lock_time)
        })
}

proptest! {
    #[test]
    fn transaction_roundtrip(tx in transaction_strategy()) {
        thunderbolt_test::init();

        let bytes = tx.thunderbolt_serialize_to_vec()?;
        let other_tx: Transaction = bytes.as_slice().thunderbolt_deserialize_into()?;

        prop_assert_eq![&tx, &other_tx];
        // The freshly parsed transaction must also agree on identity.
        prop_assert_eq![tx.hash(), other_tx.hash()];
    }

    #[test]
    fn serialized_size_matches_serialization(tx in transaction_strategy()) {
        thunderbolt_test::init();

        let bytes = tx.thunderbolt_serialize_to_vec()?;
        prop_assert_eq![bytes.len(), tx.serialized_size()];
    }

    #[test]
    fn transaction_hash_roundtrip(hash in any::<Hash>()) {
        thunderbolt_test::init();

        let bytes = hash.thunderbolt_serialize_to_vec()?;
        let other_hash: Hash = bytes.as_slice().thunderbolt_deserialize_into()?;

        prop_assert_eq![hash, other_hash];
    }
}

#[test]
fn hashes_compare_by_value() {
    thunderbolt_test::init();

    // Two hashes built through different paths must compare equal when
    // their bytes agree. (Identity comparisons are a known trap.)
    let a = Hash([0xcdu8; 32]);
    let b: Hash = "cdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcd"
        .parse()
        .expect("valid hex parses");
    assert_eq!(a, b);
}

#[test]
fn coinbase_shape_is_detected() {
    thunderbolt_test::init();

    let coinbase = Transaction::new(
        1,
        vec![Input::Coinbase {
            height: Height(5),
            data: CoinbaseData::new(Vec::new()).unwrap(),
        }],
        vec![],
        0,
    );
    assert!(coinbase.is_coinbase());
    assert!(coinbase.contains_coinbase_input());

    let not_coinbase = Transaction::new(
        1,
        vec![Input::PrevOut {
            outpoint: OutPoint {
                tx_id: Hash([1u8; 32]),
                index: 0,
            },
            unlock_script: Script(vec![]),
        }],
        vec![],
        0,
    );
    assert!(!not_coinbase.is_coinbase());
}
