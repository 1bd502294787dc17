use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Round half away from zero to `dp` decimal places through `Decimal`.
///
/// Non-finite input is returned unchanged.
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp_with_strategy(dp, rust_decimal::RoundingStrategy::MidpointAwayFromZero))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}

pub fn round_opt(value: Option<f64>, dp: u32) -> Option<f64> {
    value.map(|v| round_dp(v, dp))
}
