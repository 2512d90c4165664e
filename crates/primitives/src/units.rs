//! Fixed-point helpers for token and USD amounts.
use alloy_primitives::U256;

/// Scale of USD rates and USD values: 18 decimal places.
pub const USD_SCALE_DECIMALS: u8 = 18;

/// `10^exp` as a [`U256`].
pub fn pow10(exp: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exp))
}

/// `1.0` in 1e18 fixed point.
pub fn one_usd() -> U256 {
    pow10(USD_SCALE_DECIMALS)
}

/// Convert a fixed-point integer with `decimals` places into a float.
///
/// The integer and fractional parts are converted separately so that large amounts keep their
/// full precision up to the display step.
pub fn to_f64(value: U256, decimals: u8) -> f64 {
    let scale = pow10(decimals);
    let whole = value / scale;
    let frac = value % scale;
    let whole = u128::try_from(whole).map_or(f64::MAX, |w| w as f64);
    let frac = u128::try_from(frac).map_or(0.0, |f| f as f64);
    whole + frac / 10f64.powi(decimals as i32)
}

/// Turn a 1e18-scaled rate back into a float.
pub fn rate_to_f64(rate: U256) -> f64 {
    to_f64(rate, USD_SCALE_DECIMALS)
}

/// Convert a float rate into 1e18 fixed point, rounding to 9 significant decimals.
pub fn rate_from_f64(rate: f64) -> U256 {
    if !rate.is_finite() || rate <= 0.0 {
        return U256::ZERO;
    }
    let nano = (rate * 1e9).round() as u128;
    U256::from(nano) * pow10(9)
}

/// `amount * rate_1e18 / 10^decimals`: a token amount in smallest units, valued in 1e18 USD.
pub fn usd_value(amount: U256, rate: U256, decimals: u8) -> U256 {
    amount.saturating_mul(rate) / pow10(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_decimal_token_at_two_fifty() {
        let amount = U256::from(1_000_000u64);
        let rate = rate_from_f64(2.5);
        let usd = usd_value(amount, rate, 6);
        assert_eq!(usd, U256::from(2_500_000_000_000_000_000u128));
        assert!((to_f64(usd, USD_SCALE_DECIMALS) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn large_wei_amounts_round_trip() {
        // 123_456_789.123456789 tokens with 18 decimals at $0.75
        let amount = U256::from(123_456_789_123_456_789_000_000_000u128);
        let usd = usd_value(amount, rate_from_f64(0.75), 18);
        let expected = 123_456_789.123_456_789 * 0.75;
        let got = to_f64(usd, USD_SCALE_DECIMALS);
        assert!((got - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn accumulating_before_valuing_keeps_precision() {
        let rate = rate_from_f64(1.1);
        let mut amount = U256::ZERO;
        for _ in 0..1_000 {
            amount += U256::from(1u64);
        }
        // 1000 wei at $1.10 is exactly 1.1e-15 USD, i.e. 1100 in 1e18 units
        assert_eq!(usd_value(amount, rate, 18), U256::from(1_100u64));
    }

    #[test]
    fn zero_and_negative_rates_become_zero() {
        assert_eq!(rate_from_f64(0.0), U256::ZERO);
        assert_eq!(rate_from_f64(-3.0), U256::ZERO);
        assert_eq!(rate_from_f64(f64::NAN), U256::ZERO);
    }

    #[test]
    fn to_f64_splits_whole_and_fraction() {
        assert_eq!(to_f64(U256::from(1_500u64), 3), 1.5);
        assert_eq!(to_f64(U256::ZERO, 18), 0.0);
    }
}
