//! Hand-assembled byte vectors for codec tests.
//!
//! Layout reminder: all integers little-endian, containers carry a u32
//! count prefix, coinbase inputs are a zero outpoint followed by a
//! length-prefixed blob of height-then-data.

use lazy_static::lazy_static;

lazy_static! {
    /// A serialized coinbase transaction: one coinbase input for height
    /// zero, one 50-coin output locked unspendably.
    pub static ref DUMMY_COINBASE_TX: Vec<u8> = {
        let mut tx = Vec::new();
        // version = 1
        tx.extend(&1u32.to_le_bytes());
        // one input
        tx.extend(&1u32.to_le_bytes());
        // null outpoint
        tx.extend(&[0u8; 32]);
        tx.extend(&u32::MAX.to_le_bytes());
        // unlocking blob: 8-byte height, no free data
        tx.extend(&8u32.to_le_bytes());
        tx.extend(&0u64.to_le_bytes());
        // one output
        tx.extend(&1u32.to_le_bytes());
        // 50 coins
        tx.extend(&5_000_000_000u64.to_le_bytes());
        // unlockable lock, empty params
        tx.push(2u8);
        tx.extend(&0u32.to_le_bytes());
        // lock time
        tx.extend(&0u64.to_le_bytes());
        tx
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_coinbase_has_expected_len() {
        // 4 + 4 + 36 + 4 + 8 + 4 + 8 + 1 + 4 + 8
        assert_eq!(DUMMY_COINBASE_TX.len(), 81);
    }
}
