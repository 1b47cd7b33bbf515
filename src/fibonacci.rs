use serde::Serialize;

pub const RETRACEMENT_MULTIPLIERS: &[f64] = &[0.236, 0.382, 0.500, 0.618, 0.705, 0.786, 0.886];

/// Retracements plus the 1.13 extension level.
pub const EXTENDED_MULTIPLIERS: &[f64] = &[0.236, 0.382, 0.500, 0.618, 0.705, 0.786, 0.886, 1.13];

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct FibonacciLevel {
    pub multiplier: f64,
    pub uptrend_price: f64,
    pub downtrend_price: f64,
}

pub fn multipliers(extended: bool) -> &'static [f64] {
    if extended {
        EXTENDED_MULTIPLIERS
    } else {
        RETRACEMENT_MULTIPLIERS
    }
}

/// Retracement levels between `low` and `high`, in multiplier order.
///
/// Uptrend: `low + (high - low) * m`. Downtrend: `high - (high - low) * m`.
pub fn fibonacci_levels(high: f64, low: f64, multipliers: &[f64]) -> Vec<FibonacciLevel> {
    let range = high - low;
    multipliers
        .iter()
        .map(|&multiplier| FibonacciLevel {
            multiplier,
            uptrend_price: low + range * multiplier,
            downtrend_price: high - range * multiplier,
        })
        .collect()
}
