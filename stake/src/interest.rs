//! Simple-interest math.

use keel_types::{Amount, SECONDS_PER_YEAR};

/// Basis-point denominator: 10000 bps = 100%.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// `principal × apy_bps / 10000 × elapsed / SECONDS_PER_YEAR`, truncating.
///
/// Multiplies before dividing so truncation happens exactly once.
/// Returns `None` on overflow.
pub fn simple_interest(principal: Amount, apy_bps: u32, elapsed_secs: u64) -> Option<Amount> {
    let numerator = principal
        .raw()
        .checked_mul(apy_bps as u128)?
        .checked_mul(elapsed_secs as u128)?;
    let denominator = BPS_DENOMINATOR * SECONDS_PER_YEAR as u128;
    Some(Amount::new(numerator / denominator))
}
