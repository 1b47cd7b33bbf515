//! Buckets pivot prices around the latest close.
//!
//! A support pivot that ends up at or above the close is kept as a `resistance_below`
//! level rather than dropped, and a resistance at or below the close becomes
//! `support_above`. Both display lists therefore mix pivot kinds.

use crate::candle::{self, Candle};
use crate::pivots::PivotScan;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum LevelError {
    #[error("cannot classify levels over an empty candle window")]
    EmptyWindow,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LevelBucket {
    pub support_below: Vec<f64>,
    pub support_above: Vec<f64>,
    pub resistance_below: Vec<f64>,
    pub resistance_above: Vec<f64>,
    pub latest_close: f64,
    pub lowest_support: f64,
    pub highest_resistance: f64,
}

impl LevelBucket {
    /// `support_below` and `support_above` merged, highest first. Duplicates are kept.
    pub fn supports(&self) -> Vec<f64> {
        let mut levels: Vec<f64> = self
            .support_below
            .iter()
            .chain(&self.support_above)
            .copied()
            .collect();
        levels.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(Ordering::Equal));
        levels
    }

    /// `resistance_above` and `resistance_below` merged, lowest first. Duplicates are kept.
    pub fn resistances(&self) -> Vec<f64> {
        let mut levels: Vec<f64> = self
            .resistance_above
            .iter()
            .chain(&self.resistance_below)
            .copied()
            .collect();
        levels.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        levels
    }
}

pub fn classify_levels(scan: &PivotScan, candles: &[Candle]) -> Result<LevelBucket, LevelError> {
    let latest_close = candle::latest_close(candles).ok_or(LevelError::EmptyWindow)?;
    classify_levels_at(scan, candles, latest_close)
}

/// Classifies against an explicit reference price instead of the window's last close.
pub fn classify_levels_at(
    scan: &PivotScan,
    candles: &[Candle],
    latest_close: f64,
) -> Result<LevelBucket, LevelError> {
    let window_low = candle::window_low(candles).ok_or(LevelError::EmptyWindow)?;
    let window_high = candle::window_high(candles).ok_or(LevelError::EmptyWindow)?;

    let (mut support_below, resistance_below): (Vec<f64>, Vec<f64>) =
        scan.support_prices().partition(|&price| price < latest_close);
    let (mut resistance_above, support_above): (Vec<f64>, Vec<f64>) =
        scan.resistance_prices().partition(|&price| price > latest_close);

    if support_below.is_empty() {
        log::debug!("no support below {latest_close}, seeding with window low {window_low}");
        support_below.push(window_low);
    }
    if resistance_above.is_empty() {
        log::debug!("no resistance above {latest_close}, seeding with window high {window_high}");
        resistance_above.push(window_high);
    }

    let lowest_support = support_below.iter().copied().fold(f64::INFINITY, f64::min);
    let highest_resistance = resistance_above.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Ok(LevelBucket {
        support_below,
        support_above,
        resistance_below,
        resistance_above,
        latest_close,
        lowest_support,
        highest_resistance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::fixtures;
    use crate::pivots::{PivotKind, PivotPoint};

    fn scan(supports: &[f64], resistances: &[f64]) -> PivotScan {
        let point = |kind: PivotKind| move |(index, &price): (usize, &f64)| PivotPoint { index, price, kind };
        PivotScan {
            supports: supports.iter().enumerate().map(point(PivotKind::Support)).collect(),
            resistances: resistances.iter().enumerate().map(point(PivotKind::Resistance)).collect(),
        }
    }

    fn sorted(mut v: Vec<f64>) -> Vec<f64> {
        v.sort_by(|a, b| a.partial_cmp(b).unwrap());
        v
    }

    #[test]
    fn test_buckets_partition_pivot_prices() {
        let candles = fixtures::from_lows(&[90.0, 95.0, 100.0], 4.0);
        let pivots = scan(&[80.0, 102.0, 101.0, 110.0], &[120.0, 95.0, 102.0, 130.0]);
        let levels = classify_levels_at(&pivots, &candles, 102.0).unwrap();

        assert_eq!(levels.support_below, vec![80.0, 101.0]);
        // Supports at or above the close are reclassified, not dropped.
        assert_eq!(levels.resistance_below, vec![102.0, 110.0]);
        assert_eq!(levels.resistance_above, vec![120.0, 130.0]);
        assert_eq!(levels.support_above, vec![95.0, 102.0]);

        let from_supports = sorted([levels.support_below.clone(), levels.resistance_below.clone()].concat());
        assert_eq!(from_supports, sorted(pivots.support_prices().collect()));
        let from_resistances = sorted([levels.resistance_above.clone(), levels.support_above.clone()].concat());
        assert_eq!(from_resistances, sorted(pivots.resistance_prices().collect()));

        assert_eq!(levels.lowest_support, 80.0);
        assert_eq!(levels.highest_resistance, 130.0);
    }

    #[test]
    fn test_seeds_empty_buckets_with_window_extremes() {
        let candles = fixtures::from_lows(&[50.0, 40.0, 60.0, 55.0], 5.0);
        // Close is 57.5: every support sits above it and every resistance below it.
        let pivots = scan(&[58.0, 61.0], &[45.0, 57.0]);
        let levels = classify_levels(&pivots, &candles).unwrap();

        assert_eq!(levels.latest_close, 57.5);
        assert_eq!(levels.support_below, vec![40.0]);
        assert_eq!(levels.resistance_above, vec![65.0]);
        assert_eq!(levels.resistance_below, vec![58.0, 61.0]);
        assert_eq!(levels.support_above, vec![45.0, 57.0]);
        assert_eq!(levels.lowest_support, 40.0);
        assert_eq!(levels.highest_resistance, 65.0);
    }

    #[test]
    fn test_no_pivots_gives_full_window_range() {
        let candles = fixtures::from_lows(&[10.0], 2.0);
        let levels = classify_levels(&PivotScan::default(), &candles).unwrap();
        assert_eq!(levels.lowest_support, 10.0);
        assert_eq!(levels.highest_resistance, 12.0);
        assert!(levels.highest_resistance > levels.lowest_support);
    }

    #[test]
    fn test_display_lists_sorted_with_duplicates() {
        let candles = fixtures::from_lows(&[90.0, 95.0, 100.0], 4.0);
        let pivots = scan(&[80.0, 90.0, 90.0, 105.0], &[120.0, 95.0, 110.0, 110.0]);
        let levels = classify_levels_at(&pivots, &candles, 100.0).unwrap();

        assert_eq!(levels.supports(), vec![95.0, 90.0, 90.0, 80.0]);
        assert_eq!(levels.resistances(), vec![105.0, 110.0, 110.0, 120.0]);
    }

    #[test]
    fn test_empty_window_is_error() {
        assert_eq!(classify_levels(&PivotScan::default(), &[]), Err(LevelError::EmptyWindow));
        assert_eq!(
            classify_levels_at(&PivotScan::default(), &[], 1.0),
            Err(LevelError::EmptyWindow)
        );
    }
}
