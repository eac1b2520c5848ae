use alloy::primitives::U256;
use bigdecimal::{BigDecimal, ToPrimitive};
use std::str::FromStr;

/// Native-token decimals on every EVM chain we talk to.
const NATIVE_DECIMALS: u32 = 18;

/// Convert a raw wei amount to native-token units.
pub fn wei_to_native(value: U256) -> BigDecimal {
    BigDecimal::from_str(&format!("{}e-{}", value, NATIVE_DECIMALS)).unwrap_or_default()
}

/// Lossy float view of a wei amount, for descriptions and logs.
pub fn wei_to_native_f64(value: U256) -> f64 {
    wei_to_native(value).to_f64().unwrap_or(0.0)
}

/// Convert a native-token amount from config into wei.
/// Negative or non-finite inputs map to zero; sub-wei precision is truncated.
pub fn native_to_wei(amount: f64) -> U256 {
    if !amount.is_finite() || amount <= 0.0 {
        return U256::ZERO;
    }

    let Ok(native) = BigDecimal::from_str(&amount.to_string()) else {
        return U256::ZERO;
    };
    let scale = BigDecimal::from(10u64.pow(NATIVE_DECIMALS));
    let (digits, _) = (native * scale).with_scale(0).into_bigint_and_exponent();

    U256::from_str_radix(&digits.to_string(), 10).unwrap_or(U256::ZERO)
}
