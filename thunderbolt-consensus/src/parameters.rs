//! Consensus schedule constants.

use thunderbolt_chain::block::Height;

/// The blocks between subsidy halvings.
pub const HALVING_INTERVAL: Height = Height(210_000);

/// The starting block subsidy, in atomic units (50 coins).
pub const MAX_BLOCK_SUBSIDY: u64 = 5_000_000_000;

/// The ceiling on transactions selected into a work template, leaving
/// headroom under the block size limit for the header and coinbase.
pub const MAX_TEMPLATE_BYTES: usize = 950_000;
