//! Chain utility functions.

use thunderbolt_chain::block::Height;

/// The heights of the hashes in a block locator: the last ten blocks
/// densely, then exponentially sparser steps back to genesis.
///
/// Peers scan a locator newest-first for the first hash they recognize,
/// so dense entries near the tip find small divergences cheaply while
/// the sparse tail bounds the list length logarithmically.
pub fn block_locator_heights(tip_height: Height) -> Vec<Height> {
    let mut heights = Vec::new();
    let mut current = tip_height.0;
    let mut step = 1u64;

    loop {
        heights.push(Height(current));
        if current == 0 {
            break;
        }
        if heights.len() >= 10 {
            step = step.saturating_mul(2);
        }
        current = current.saturating_sub(step);
    }

    heights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_starts_dense_and_ends_at_genesis() {
        let heights = block_locator_heights(Height(1000));

        assert_eq!(heights[0], Height(1000));
        // The first ten steps go back one block at a time.
        for i in 0..10 {
            assert_eq!(heights[i], Height(1000 - i as u64));
        }
        assert_eq!(*heights.last().unwrap(), Height(0));
        // The exponential tail keeps the locator short.
        assert!(heights.len() < 32);
    }

    #[test]
    fn locator_for_short_chain_is_every_height() {
        let heights = block_locator_heights(Height(3));
        assert_eq!(
            heights,
            vec![Height(3), Height(2), Height(1), Height(0)]
        );
    }
}
