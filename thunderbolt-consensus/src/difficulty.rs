//! The difficulty retarget schedule.
//!
//! Every [`RETARGET_INTERVAL`] blocks the target is scaled by the ratio
//! of the observed interval timespan to [`TARGET_TIMESPAN_SECONDS`],
//! clamped to a factor of four in either direction, capped at the
//! network's proof-of-work limit, and reduced to compact-mantissa
//! precision. Between retarget heights, bits must not change at all.

use primitive_types::U256;

use thunderbolt_chain::{
    block::{Header, Height},
    parameters::{Network, RETARGET_INTERVAL, TARGET_TIMESPAN_SECONDS},
    work::difficulty::{CompactDifficulty, ExpandedDifficulty},
};

use crate::error::BlockError;

/// Whether a block at `height` carries retargeted bits.
pub fn is_retarget_height(height: Height) -> bool {
    height.0 != 0 && height.0 % RETARGET_INTERVAL == 0
}

/// The height of the retarget anchor for a block at `height`: the start
/// of the interval the retarget measures.
pub fn retarget_anchor_height(height: Height) -> Height {
    debug_assert!(is_retarget_height(height));
    Height(height.0 - RETARGET_INTERVAL)
}

/// The raw retargeted target before precision reduction: anchor target
/// scaled by the clamped timespan, capped at the proof-of-work limit.
fn retarget_target(
    network: Network,
    anchor: &Header,
    parent: &Header,
) -> Result<ExpandedDifficulty, BlockError> {
    let anchor_target = anchor
        .bits
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(anchor.bits))?;

    let observed = parent.timestamp.saturating_sub(anchor.timestamp);
    let timespan = observed
        .max(TARGET_TIMESPAN_SECONDS / 4)
        .min(TARGET_TIMESPAN_SECONDS * 4);

    // Targets sit far enough below 2^256 that scaling by a timespan
    // cannot overflow: the pow limit keeps at least three leading zero
    // bits, and the clamped timespan fits in 23.
    let scaled = anchor_target.to_u256() * U256::from(timespan)
        / U256::from(TARGET_TIMESPAN_SECONDS);

    let pow_limit = network
        .pow_limit()
        .to_expanded()
        .expect("the pow limit is a valid difficulty encoding");

    if ExpandedDifficulty::from_u256(scaled) > pow_limit {
        Ok(pow_limit)
    } else {
        Ok(ExpandedDifficulty::from_u256(scaled))
    }
}

/// The bits the next block (at `next_height`) is required to carry.
///
/// `anchor` must be the header at `retarget_anchor_height(next_height)`
/// when `next_height` is a retarget height, and is ignored otherwise.
pub fn next_bits(
    network: Network,
    parent: &Header,
    next_height: Height,
    anchor: Option<&Header>,
) -> Result<CompactDifficulty, BlockError> {
    if !is_retarget_height(next_height) {
        return Ok(parent.bits);
    }

    let anchor = anchor.expect("caller resolves the anchor for retarget heights");
    Ok(retarget_target(network, anchor, parent)?.to_compact())
}

/// Check a block's bits against the schedule.
///
/// Off retarget heights the bits must equal the parent's exactly. On
/// retarget heights the recomputed target is masked down to the
/// precision of the *block's* claimed exponent and must then match the
/// block's expanded bits exactly. An exponent below 3 cannot carry a
/// full mantissa, so such an encoding is rejected outright rather than
/// shifted into undefined behavior.
pub fn check_difficulty(
    network: Network,
    parent: &Header,
    block_height: Height,
    anchor: Option<&Header>,
    block: &Header,
) -> Result<(), BlockError> {
    if !is_retarget_height(block_height) {
        if block.bits != parent.bits {
            return Err(BlockError::DifficultyMismatch {
                actual: block.bits,
                expected: parent.bits,
            });
        }
        return Ok(());
    }

    let anchor = anchor.expect("caller resolves the anchor for retarget heights");
    let new_target = retarget_target(network, anchor, parent)?;

    let exponent = block.bits.exponent();
    if exponent < 3 {
        return Err(BlockError::DifficultyPrecision);
    }

    let mask = U256::from(0x00ff_ffffu32) << (8 * (exponent as u32 - 3));
    let masked = new_target.to_u256() & mask;

    let claimed = block
        .bits
        .to_expanded()
        .ok_or(BlockError::InvalidDifficulty(block.bits))?;

    if claimed.to_u256() != masked {
        return Err(BlockError::DifficultyMismatch {
            actual: block.bits,
            expected: ExpandedDifficulty::from_u256(masked).to_compact(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunderbolt_chain::block::{merkle, Hash};

    fn header_with(timestamp: u64, bits: u32) -> Header {
        Header::new(
            1,
            Hash([0u8; 32]),
            merkle::Root([0u8; 32]),
            timestamp,
            CompactDifficulty(bits),
            0,
        )
    }

    #[test]
    fn retarget_heights_are_exact_multiples() {
        assert!(!is_retarget_height(Height(0)));
        assert!(!is_retarget_height(Height(RETARGET_INTERVAL - 1)));
        assert!(is_retarget_height(Height(RETARGET_INTERVAL)));
        assert!(!is_retarget_height(Height(RETARGET_INTERVAL + 1)));
        assert!(is_retarget_height(Height(RETARGET_INTERVAL * 5)));
    }

    #[test]
    fn bits_must_not_change_between_retargets() {
        let parent = header_with(1000, 0x1d00_ffff);
        let good = header_with(1600, 0x1d00_ffff);
        let bad = header_with(1600, 0x1d00_fffe);

        assert!(
            check_difficulty(Network::Mainnet, &parent, Height(5), None, &good).is_ok()
        );
        assert!(matches!(
            check_difficulty(Network::Mainnet, &parent, Height(5), None, &bad),
            Err(BlockError::DifficultyMismatch { .. })
        ));
    }

    #[test]
    fn on_schedule_interval_keeps_bits() {
        // An interval spanning exactly the target timespan leaves the
        // target unchanged.
        let bits = 0x1c7f_ffff;
        let anchor = header_with(0, bits);
        let parent = header_with(TARGET_TIMESPAN_SECONDS, bits);

        let next = next_bits(
            Network::Mainnet,
            &parent,
            Height(RETARGET_INTERVAL),
            Some(&anchor),
        )
        .unwrap();
        assert_eq!(next, CompactDifficulty(bits));
    }

    #[test]
    fn half_timespan_halves_the_target() {
        let bits = 0x1c7f_fffe;
        let anchor = header_with(0, bits);
        let parent = header_with(TARGET_TIMESPAN_SECONDS / 2, bits);

        let next = next_bits(
            Network::Mainnet,
            &parent,
            Height(RETARGET_INTERVAL),
            Some(&anchor),
        )
        .unwrap();

        let old = CompactDifficulty(bits).to_expanded().unwrap();
        let new = next.to_expanded().unwrap();
        assert_eq!(
            new.to_u256(),
            old.to_u256() / U256::from(2u32)
        );
    }

    #[test]
    fn timespan_is_clamped_at_a_factor_of_four() {
        let bits = 0x1c10_0000;
        let anchor = header_with(0, bits);
        // An absurdly slow interval still only eases the target 4x.
        let parent = header_with(TARGET_TIMESPAN_SECONDS * 100, bits);

        let next = next_bits(
            Network::Mainnet,
            &parent,
            Height(RETARGET_INTERVAL),
            Some(&anchor),
        )
        .unwrap();

        let old = CompactDifficulty(bits).to_expanded().unwrap();
        let new = next.to_expanded().unwrap();
        assert_eq!(
            new.to_u256(),
            old.to_u256() * U256::from(4u32)
        );

        // And an instantaneous interval only tightens it 4x.
        let parent = header_with(0, bits);
        let next = next_bits(
            Network::Mainnet,
            &parent,
            Height(RETARGET_INTERVAL),
            Some(&anchor),
        )
        .unwrap();
        let new = next.to_expanded().unwrap();
        assert_eq!(
            new.to_u256(),
            old.to_u256() / U256::from(4u32)
        );
    }

    #[test]
    fn retarget_caps_at_the_pow_limit() {
        let bits = Network::Mainnet.pow_limit().0;
        let anchor = header_with(0, bits);
        let parent = header_with(TARGET_TIMESPAN_SECONDS * 4, bits);

        let next = next_bits(
            Network::Mainnet,
            &parent,
            Height(RETARGET_INTERVAL),
            Some(&anchor),
        )
        .unwrap();
        assert_eq!(next, Network::Mainnet.pow_limit());
    }

    #[test]
    fn tiny_exponent_is_a_consensus_failure() {
        let anchor = header_with(0, 0x1c10_0000);
        let parent = header_with(TARGET_TIMESPAN_SECONDS, 0x1c10_0000);
        let block = header_with(TARGET_TIMESPAN_SECONDS + 600, 0x0200_00ff);

        assert!(matches!(
            check_difficulty(
                Network::Mainnet,
                &parent,
                Height(RETARGET_INTERVAL),
                Some(&anchor),
                &block
            ),
            Err(BlockError::DifficultyPrecision)
        ));
    }
}
