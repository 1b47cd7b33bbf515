use anyhow::{Result, anyhow};
use serde::Serialize;
use ta::Next;
use ta::indicators::{
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
};

use crate::candle::Candle;
use crate::storage_utils::AnalysisConfig;

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct MacdPoint {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SmaSeries {
    pub length: usize,
    pub values: Vec<Option<f64>>,
}

impl SmaSeries {
    pub fn last(&self) -> Option<f64> {
        self.values.iter().rev().find_map(|v| *v)
    }
}

/// Indicator series aligned to candle indices. Entries are `None` while the
/// indicator is warming up and for the latest, still-forming candle.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub smas: Vec<SmaSeries>,
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<MacdPoint>>,
}

impl IndicatorSet {
    pub fn last_rsi(&self) -> Option<f64> {
        self.rsi.iter().rev().find_map(|v| *v)
    }

    pub fn last_macd(&self) -> Option<MacdPoint> {
        self.macd.iter().rev().find_map(|v| *v)
    }
}

/// Feeds `closes` through `next` and pads the result to `len`, blanking the first
/// `warmup - 1` outputs.
fn aligned<T>(closes: &[f64], len: usize, warmup: usize, mut next: impl FnMut(f64) -> T) -> Vec<Option<T>> {
    let mut out: Vec<Option<T>> = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let value = next(close);
            (i + 1 >= warmup).then_some(value)
        })
        .collect();
    out.resize_with(len, || None);
    out
}

pub fn sma_series(closes: &[f64], len: usize, length: usize) -> Result<SmaSeries> {
    let mut sma = SimpleMovingAverage::new(length).map_err(|e| anyhow!("SMA({}): {:?}", length, e))?;
    Ok(SmaSeries {
        length,
        values: aligned(closes, len, length, |c| sma.next(c)),
    })
}

/// RSI is defined once `period` price changes have been seen.
pub fn rsi_series(closes: &[f64], len: usize, period: usize) -> Result<Vec<Option<f64>>> {
    let mut rsi = RelativeStrengthIndex::new(period).map_err(|e| anyhow!("RSI({}): {:?}", period, e))?;
    Ok(aligned(closes, len, period + 1, |c| rsi.next(c)))
}

pub fn macd_series(
    closes: &[f64],
    len: usize,
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<Vec<Option<MacdPoint>>> {
    let mut macd = MovingAverageConvergenceDivergence::new(fast, slow, signal)
        .map_err(|e| anyhow!("MACD({}, {}, {}): {:?}", fast, slow, signal, e))?;
    Ok(aligned(closes, len, slow + signal - 1, |c| {
        let out = macd.next(c);
        MacdPoint {
            macd: out.macd,
            signal: out.signal,
            histogram: out.histogram,
        }
    }))
}

/// Computes SMA, RSI and MACD over every candle except the latest.
pub fn compute(candles: &[Candle], config: &AnalysisConfig) -> Result<IndicatorSet> {
    let completed = candles.len().saturating_sub(1);
    let closes: Vec<f64> = candles[..completed].iter().map(|c| c.close).collect();
    let len = candles.len();

    let smas = config
        .sma_lengths
        .iter()
        .map(|&length| sma_series(&closes, len, length))
        .collect::<Result<Vec<_>>>()?;

    Ok(IndicatorSet {
        smas,
        rsi: rsi_series(&closes, len, config.rsi_period)?,
        macd: macd_series(&closes, len, config.macd_fast, config.macd_slow, config.macd_signal)?,
    })
}
