//! Block subsidies and halvings.

use std::convert::TryFrom;

use thunderbolt_chain::{
    amount::{Amount, Error, NonNegative},
    block::Height,
};

use crate::parameters::{HALVING_INTERVAL, MAX_BLOCK_SUBSIDY};

/// The `BlockSubsidy(height)`.
///
/// The subsidy starts at 50 coins and halves every
/// [`HALVING_INTERVAL`] blocks until the 64th halving shifts it to
/// zero.
pub fn block_subsidy(height: Height) -> Result<Amount<NonNegative>, Error> {
    let halvings = height.0 / HALVING_INTERVAL.0;
    if halvings >= 64 {
        return Amount::try_from(0i64);
    }
    let subsidy = MAX_BLOCK_SUBSIDY >> halvings;
    Amount::try_from(subsidy)
}

#[cfg(test)]
mod test {
    use super::*;
    use color_eyre::Report;

    #[test]
    fn block_subsidy_halves_on_schedule() -> Result<(), Report> {
        thunderbolt_test::init();

        assert_eq!(
            Amount::try_from(5_000_000_000i64),
            block_subsidy(Height(0))
        );
        assert_eq!(
            Amount::try_from(5_000_000_000i64),
            block_subsidy(Height(HALVING_INTERVAL.0 - 1))
        );
        // After the first halving, it's 25 coins
        assert_eq!(
            Amount::try_from(2_500_000_000i64),
            block_subsidy(HALVING_INTERVAL)
        );
        // After the second halving, it's 12.5 coins
        assert_eq!(
            Amount::try_from(1_250_000_000i64),
            block_subsidy(Height(HALVING_INTERVAL.0 * 2))
        );

        // After the 32nd halving, the block subsidy is 1 atomic unit
        assert_eq!(
            Amount::try_from(1i64),
            block_subsidy(Height(HALVING_INTERVAL.0 * 32))
        );

        // After the 33rd halving, there is no block subsidy
        assert_eq!(
            Amount::try_from(0i64),
            block_subsidy(Height(HALVING_INTERVAL.0 * 33))
        );
        assert_eq!(
            Amount::try_from(0i64),
            block_subsidy(Height(HALVING_INTERVAL.0 * 64))
        );

        Ok(())
    }
}
