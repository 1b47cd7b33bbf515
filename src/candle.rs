use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserializer, Serialize};
use std::fmt;

/// One OHLCV bar of the analysed window.
///
/// `index` is the position in the oldest-first window, so the pivot scan and the
/// chart can refer to candles without carrying the timestamp around.
#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        self.close - self.open
    }

    pub fn body_abs(&self) -> f64 {
        self.body().abs()
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    pub fn upper_wick(&self) -> f64 {
        self.high - self.close.max(self.open)
    }

    pub fn lower_wick(&self) -> f64 {
        self.close.min(self.open) - self.low
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Body size relative to the full range, 0.0 for a flat candle.
    pub fn body_ratio(&self) -> f64 {
        let range = self.range();
        if range == 0.0 {
            0.0
        } else {
            self.body_abs() / range
        }
    }

    pub fn body_midpoint(&self) -> f64 {
        (self.open + self.close) / 2.0
    }
}

/// Closing price of the most recent candle in the window.
pub fn latest_close(candles: &[Candle]) -> Option<f64> {
    candles.last().map(|c| c.close)
}

/// Lowest low across the window.
pub fn window_low(candles: &[Candle]) -> Option<f64> {
    candles.iter().map(|c| c.low).reduce(f64::min)
}

/// Highest high across the window.
pub fn window_high(candles: &[Candle]) -> Option<f64> {
    candles.iter().map(|c| c.high).reduce(f64::max)
}

// --- Lenient number parsing ---
// Binance sends prices as strings, the CSV file stores them as plain numbers
// and an empty cell means the row is incomplete.

struct LenientF64Visitor;

impl<'de> Visitor<'de> for LenientF64Visitor {
    type Value = Option<f64>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a float, an integer, or a string representing a number")
    }

    fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
        Ok(Some(v as f64))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        let v = v.trim();
        if v.is_empty() || v.eq_ignore_ascii_case("null") {
            Ok(None)
        } else {
            v.parse::<f64>().map(Some).map_err(E::custom)
        }
    }

    fn visit_unit<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E>(self) -> Result<Self::Value, E> {
        Ok(None)
    }
}

pub fn deserialize_f64_lenient<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientF64Visitor)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Candle;
    use chrono::{DateTime, Duration};

    /// Builds an oldest-first window from (open, high, low, close) tuples, one day apart.
    pub fn window(ohlc: &[(f64, f64, f64, f64)]) -> Vec<Candle> {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default();
        ohlc.iter()
            .enumerate()
            .map(|(index, &(open, high, low, close))| Candle {
                index,
                timestamp: start + Duration::days(index as i64),
                open,
                high,
                low,
                close,
                volume: 1.0,
            })
            .collect()
    }

    /// Window where highs sit `offset` above the lows and the close is the midpoint.
    pub fn from_lows(lows: &[f64], offset: f64) -> Vec<Candle> {
        let ohlc: Vec<_> = lows
            .iter()
            .map(|&low| {
                let mid = low + offset / 2.0;
                (mid, low + offset, low, mid)
            })
            .collect();
        window(&ohlc)
    }
}
