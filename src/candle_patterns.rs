//! Candlestick pattern flags (doji, hammer, engulfing, stars, ...).
//!
//! Every check looks at the candle at `index` and, for multi-candle patterns, the
//! candles right before it. Missing neighbours mean the pattern does not match.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::candle::Candle;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandlePattern {
    Doji,
    DragonflyDoji,
    GravestoneDoji,
    Hammer,
    InvertedHammer,
    HangingMan,
    ShootingStar,
    BullishEngulfing,
    BearishEngulfing,
    BullishHarami,
    BearishHarami,
    PiercingPattern,
    DarkCloudCover,
    MorningStar,
    MorningStarDoji,
    Star,
}

impl CandlePattern {
    pub const ALL: [CandlePattern; 16] = [
        CandlePattern::InvertedHammer,
        CandlePattern::Hammer,
        CandlePattern::Doji,
        CandlePattern::BearishHarami,
        CandlePattern::BearishEngulfing,
        CandlePattern::BullishHarami,
        CandlePattern::BullishEngulfing,
        CandlePattern::DarkCloudCover,
        CandlePattern::DragonflyDoji,
        CandlePattern::HangingMan,
        CandlePattern::GravestoneDoji,
        CandlePattern::MorningStar,
        CandlePattern::MorningStarDoji,
        CandlePattern::PiercingPattern,
        CandlePattern::Star,
        CandlePattern::ShootingStar,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CandlePattern::Doji => "Doji",
            CandlePattern::DragonflyDoji => "Dragonfly doji",
            CandlePattern::GravestoneDoji => "Gravestone doji",
            CandlePattern::Hammer => "Hammer",
            CandlePattern::InvertedHammer => "Inverted hammer",
            CandlePattern::HangingMan => "Hanging man",
            CandlePattern::ShootingStar => "Shooting star",
            CandlePattern::BullishEngulfing => "Bullish engulfing",
            CandlePattern::BearishEngulfing => "Bearish engulfing",
            CandlePattern::BullishHarami => "Bullish harami",
            CandlePattern::BearishHarami => "Bearish harami",
            CandlePattern::PiercingPattern => "Piercing pattern",
            CandlePattern::DarkCloudCover => "Dark cloud cover",
            CandlePattern::MorningStar => "Morning star",
            CandlePattern::MorningStarDoji => "Morning star doji",
            CandlePattern::Star => "Star",
        }
    }

    pub fn matches(&self, candles: &[Candle], index: usize) -> bool {
        let Some(curr) = candles.get(index) else {
            return false;
        };
        let prev = index.checked_sub(1).and_then(|i| candles.get(i));
        let first = index.checked_sub(2).and_then(|i| candles.get(i));

        match self {
            CandlePattern::Doji => is_doji(curr),
            CandlePattern::DragonflyDoji => {
                is_doji(curr) && curr.upper_wick() <= 0.1 * curr.range() && curr.lower_wick() >= 0.6 * curr.range()
            }
            CandlePattern::GravestoneDoji => {
                is_doji(curr) && curr.lower_wick() <= 0.1 * curr.range() && curr.upper_wick() >= 0.6 * curr.range()
            }
            CandlePattern::Hammer => hammer_shape(curr) && prev.is_some_and(Candle::is_bearish),
            CandlePattern::HangingMan => hammer_shape(curr) && prev.is_some_and(Candle::is_bullish),
            CandlePattern::InvertedHammer => {
                inverted_hammer_shape(curr) && prev.is_some_and(Candle::is_bearish)
            }
            CandlePattern::ShootingStar => {
                inverted_hammer_shape(curr) && prev.is_some_and(Candle::is_bullish)
            }
            CandlePattern::BullishEngulfing => prev.is_some_and(|p| {
                p.is_bearish() && curr.is_bullish() && curr.open <= p.close && curr.close >= p.open
            }),
            CandlePattern::BearishEngulfing => prev.is_some_and(|p| {
                p.is_bullish() && curr.is_bearish() && curr.open >= p.close && curr.close <= p.open
            }),
            CandlePattern::BullishHarami => prev.is_some_and(|p| {
                p.is_bearish()
                    && curr.is_bullish()
                    && curr.open > p.close
                    && curr.close < p.open
            }),
            CandlePattern::BearishHarami => prev.is_some_and(|p| {
                p.is_bullish()
                    && curr.is_bearish()
                    && curr.open < p.close
                    && curr.close > p.open
            }),
            CandlePattern::PiercingPattern => prev.is_some_and(|p| {
                p.is_bearish()
                    && curr.is_bullish()
                    && curr.open < p.close
                    && curr.close > p.body_midpoint()
                    && curr.close < p.open
            }),
            CandlePattern::DarkCloudCover => prev.is_some_and(|p| {
                p.is_bullish()
                    && curr.is_bearish()
                    && curr.open > p.close
                    && curr.close < p.body_midpoint()
                    && curr.close > p.open
            }),
            CandlePattern::MorningStar => match (first, prev) {
                (Some(f), Some(s)) => morning_star(f, s, curr) && s.body_ratio() < 0.3,
                _ => false,
            },
            CandlePattern::MorningStarDoji => match (first, prev) {
                (Some(f), Some(s)) => morning_star(f, s, curr) && is_doji(s),
                _ => false,
            },
            CandlePattern::Star => prev.is_some_and(|p| {
                let gapped_up = p.is_bullish() && curr.open.min(curr.close) > p.close;
                let gapped_down = p.is_bearish() && curr.open.max(curr.close) < p.close;
                p.body_ratio() > 0.5 && curr.body_ratio() < 0.3 && (gapped_up || gapped_down)
            }),
        }
    }
}

fn is_doji(c: &Candle) -> bool {
    c.range() > 0.0 && c.body_ratio() < 0.1
}

fn hammer_shape(c: &Candle) -> bool {
    let body = c.body_abs();
    body > 0.0 && c.lower_wick() >= body * 2.0 && c.upper_wick() <= body * 0.5
}

fn inverted_hammer_shape(c: &Candle) -> bool {
    let body = c.body_abs();
    body > 0.0 && c.upper_wick() >= body * 2.0 && c.lower_wick() <= body * 0.5
}

/// Strong bearish candle, small-bodied pause, then a strong bullish close into the first body.
fn morning_star(first: &Candle, second: &Candle, third: &Candle) -> bool {
    first.is_bearish()
        && first.body_ratio() > 0.5
        && second.open.max(second.close) <= first.close
        && third.is_bullish()
        && third.body_ratio() > 0.5
        && third.close > first.body_midpoint()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub pattern: CandlePattern,
}

/// All patterns at `index`.
pub fn detect(candles: &[Candle], index: usize) -> Vec<CandlePattern> {
    CandlePattern::ALL
        .into_iter()
        .filter(|p| p.matches(candles, index))
        .collect()
}

/// Completed candles scanned by default, counting back from the one before the latest.
pub const PATTERN_LOOKBACK: usize = 27;

/// Scans the `lookback` candles before the latest one, newest first.
pub fn recent_patterns(candles: &[Candle], lookback: usize) -> Vec<PatternMatch> {
    let end = candles.len().saturating_sub(1);
    let start = end.saturating_sub(lookback);
    (start..end)
        .rev()
        .flat_map(|index| {
            detect(candles, index).into_iter().map(move |pattern| PatternMatch {
                index,
                timestamp: candles[index].timestamp,
                pattern,
            })
        })
        .collect()
}
