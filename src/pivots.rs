//! Support/resistance pivot detection.
//!
//! A candle is a support pivot when the lows run down into it for `before` candles
//! and back up for `sens` candles after it. Resistance is the mirror image on highs.
//! Comparisons are non-strict, so flat stretches keep a run alive.

use crate::candle::Candle;
use serde::Serialize;
use std::ops::RangeInclusive;

/// Number of candles that must lead into a pivot.
pub const BEFORE_COUNT: usize = 3;

/// Default number of candles that must confirm a pivot.
pub const DEFAULT_SENSITIVITY: usize = 2;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    Support,
    Resistance,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct PivotPoint {
    pub index: usize,
    pub price: f64,
    pub kind: PivotKind,
}

/// Outcome of testing one candle for one kind of pivot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Pivot(PivotKind),
    NoMatch,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct PivotScan {
    pub supports: Vec<PivotPoint>,
    pub resistances: Vec<PivotPoint>,
}

impl PivotScan {
    pub fn support_prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.supports.iter().map(|p| p.price)
    }

    pub fn resistance_prices(&self) -> impl Iterator<Item = f64> + '_ {
        self.resistances.iter().map(|p| p.price)
    }

    pub fn is_empty(&self) -> bool {
        self.supports.is_empty() && self.resistances.is_empty()
    }
}

/// Checks `holds(prev, current)` for every step `j` in `steps`, comparing candle `j`
/// against candle `j - 1`. Returns `None` when a step reaches outside the window.
fn run_holds(
    candles: &[Candle],
    steps: RangeInclusive<usize>,
    value: fn(&Candle) -> f64,
    holds: fn(f64, f64) -> bool,
) -> Option<bool> {
    for j in steps {
        let prev = candles.get(j.checked_sub(1)?)?;
        let current = candles.get(j)?;
        if !holds(value(prev), value(current)) {
            return Some(false);
        }
    }
    Some(true)
}

fn probe(
    candles: &[Candle],
    index: usize,
    before: usize,
    sens: usize,
    kind: PivotKind,
) -> Probe {
    let (value, lead_in, confirm): (fn(&Candle) -> f64, fn(f64, f64) -> bool, fn(f64, f64) -> bool) =
        match kind {
            PivotKind::Support => (|c| c.low, |prev, cur| cur <= prev, |prev, cur| cur >= prev),
            PivotKind::Resistance => (|c| c.high, |prev, cur| cur >= prev, |prev, cur| cur <= prev),
        };

    let Some(first) = (index + 1).checked_sub(before) else {
        return Probe::NoMatch;
    };
    // The lead-in is evaluated first; a broken lead-in rejects the candle even if the
    // confirmation run would have fallen off the end of the window.
    match run_holds(candles, first..=index, value, lead_in) {
        Some(true) => {}
        _ => return Probe::NoMatch,
    }
    if sens == 0 {
        return Probe::Pivot(kind);
    }
    let Some(last) = index.checked_add(sens) else {
        return Probe::NoMatch;
    };
    match run_holds(candles, index + 1..=last, value, confirm) {
        Some(true) => Probe::Pivot(kind),
        _ => Probe::NoMatch,
    }
}

/// Tests candle `index` for a support pivot.
pub fn probe_support(candles: &[Candle], index: usize, before: usize, sens: usize) -> Probe {
    probe(candles, index, before, sens, PivotKind::Support)
}

/// Tests candle `index` for a resistance pivot.
pub fn probe_resistance(candles: &[Candle], index: usize, before: usize, sens: usize) -> Probe {
    probe(candles, index, before, sens, PivotKind::Resistance)
}

/// Scans the window for support and resistance pivots.
///
/// Candidates run from `before` to `len - 2`; the last candle may still be forming and
/// is never a pivot. A window too short for any candidate yields an empty scan.
pub fn detect_pivots(candles: &[Candle], before: usize, sens: usize) -> PivotScan {
    let mut scan = PivotScan::default();
    let end = candles.len().saturating_sub(1);

    for index in before..end {
        let candle = &candles[index];
        if let Probe::Pivot(kind) = probe_support(candles, index, before, sens) {
            scan.supports.push(PivotPoint { index, price: candle.low, kind });
        }
        if let Probe::Pivot(kind) = probe_resistance(candles, index, before, sens) {
            scan.resistances.push(PivotPoint { index, price: candle.high, kind });
        }
    }

    log::debug!(
        "pivot scan over {} candles: {} supports, {} resistances",
        candles.len(),
        scan.supports.len(),
        scan.resistances.len()
    );
    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::fixtures;

    fn indices(points: &[PivotPoint]) -> Vec<usize> {
        points.iter().map(|p| p.index).collect()
    }

    #[test]
    fn test_huge_sensitivity_is_no_match() {
        let candles = fixtures::from_lows(&[10.0, 9.0, 8.0, 7.0, 8.0, 9.0, 10.0], 2.0);
        assert_eq!(probe_support(&candles, 3, BEFORE_COUNT, usize::MAX), Probe::NoMatch);
        assert!(detect_pivots(&candles, BEFORE_COUNT, usize::MAX).is_empty());
        assert!(detect_pivots(&candles, usize::MAX, DEFAULT_SENSITIVITY).is_empty());
    }

    #[test]
    fn test_double_dip_finds_second_trough() {
        let lows = [10.0, 9.0, 8.0, 9.0, 10.0, 9.0, 8.0, 7.0, 8.0, 9.0];
        let candles = fixtures::from_lows(&lows, 2.0);
        let scan = detect_pivots(&candles, BEFORE_COUNT, DEFAULT_SENSITIVITY);

        // Index 2 has no candle before index 0 to lead into it, so only the second trough counts.
        assert_eq!(indices(&scan.supports), vec![7]);
        assert_eq!(scan.supports[0].price, 7.0);
        assert_eq!(scan.supports[0].kind, PivotKind::Support);
        assert!(scan.resistances.is_empty());
    }

    #[test]
    fn test_first_trough_found_with_longer_lead_in() {
        let lows = [11.0, 10.0, 9.0, 8.0, 9.0, 10.0, 9.0, 8.0, 7.0, 8.0, 9.0];
        let candles = fixtures::from_lows(&lows, 2.0);
        let scan = detect_pivots(&candles, BEFORE_COUNT, DEFAULT_SENSITIVITY);
        assert_eq!(indices(&scan.supports), vec![3, 8]);
    }

    #[test]
    fn test_peak_is_resistance() {
        let lows = [1.0, 2.0, 3.0, 4.0, 3.0, 2.0, 1.0];
        let candles = fixtures::from_lows(&lows, 1.0);
        let scan = detect_pivots(&candles, BEFORE_COUNT, DEFAULT_SENSITIVITY);
        assert_eq!(indices(&scan.resistances), vec![3]);
        assert_eq!(scan.resistances[0].price, 5.0);
        assert_eq!(scan.resistances[0].kind, PivotKind::Resistance);
    }

    #[test]
    fn test_ties_do_not_break_run() {
        let lows = [5.0, 5.0, 5.0, 5.0, 5.0, 5.0, 5.0];
        let candles = fixtures::from_lows(&lows, 1.0);
        let scan = detect_pivots(&candles, BEFORE_COUNT, DEFAULT_SENSITIVITY);
        // Flat prices satisfy both tests wherever the confirmation run fits in the window.
        assert_eq!(indices(&scan.supports), vec![3, 4]);
        assert_eq!(indices(&scan.resistances), vec![3, 4]);
    }

    #[test]
    fn test_lead_in_must_be_monotonic() {
        let candles = fixtures::from_lows(&[9.0, 10.0, 9.0, 8.0, 9.0, 10.0, 11.0], 2.0);
        assert_eq!(probe_support(&candles, 3, 3, 2), Probe::NoMatch);
        assert_eq!(probe_support(&candles, 3, 2, 2), Probe::Pivot(PivotKind::Support));
    }

    #[test]
    fn test_confirmation_off_window_is_no_match() {
        let candles = fixtures::from_lows(&[10.0, 9.0, 8.0, 7.0, 8.0], 2.0);
        assert_eq!(probe_support(&candles, 3, 3, 2), Probe::NoMatch);
        assert_eq!(probe_support(&candles, 3, 3, 1), Probe::Pivot(PivotKind::Support));
        assert_eq!(probe_support(&candles, 10, 3, 1), Probe::NoMatch);
        assert_eq!(probe_support(&candles, 1, 3, 1), Probe::NoMatch);
    }

    #[test]
    fn test_sensitivity_changes_confirmation_length() {
        let lows = [10.0, 9.0, 8.0, 7.0, 8.0, 7.5, 9.0, 10.0];
        let candles = fixtures::from_lows(&lows, 2.0);
        assert_eq!(indices(&detect_pivots(&candles, 3, 1).supports), vec![3]);
        assert!(detect_pivots(&candles, 3, 2).supports.is_empty());
    }

    #[test]
    fn test_short_and_empty_windows() {
        assert!(detect_pivots(&[], BEFORE_COUNT, DEFAULT_SENSITIVITY).is_empty());
        let candles = fixtures::from_lows(&[3.0, 2.0, 1.0], 1.0);
        assert!(detect_pivots(&candles, BEFORE_COUNT, DEFAULT_SENSITIVITY).is_empty());
    }

    #[test]
    fn test_pivots_respect_monotonic_runs() {
        let lows = [
            12.0, 11.0, 10.5, 10.0, 11.0, 12.0, 12.5, 13.0, 12.0, 11.0, 10.0, 9.0, 9.5, 10.0,
            10.0, 11.0, 12.0,
        ];
        let candles = fixtures::from_lows(&lows, 3.0);
        let scan = detect_pivots(&candles, BEFORE_COUNT, DEFAULT_SENSITIVITY);
        assert!(!scan.supports.is_empty());
        for p in &scan.supports {
            let i = p.index;
            assert!(i >= BEFORE_COUNT && i + 1 < candles.len());
            for j in i + 1 - BEFORE_COUNT..=i {
                assert!(candles[j].low <= candles[j - 1].low);
            }
            for j in i + 1..=i + DEFAULT_SENSITIVITY {
                assert!(candles[j].low >= candles[j - 1].low);
            }
        }
        for p in &scan.resistances {
            let i = p.index;
            for j in i + 1 - BEFORE_COUNT..=i {
                assert!(candles[j].high >= candles[j - 1].high);
            }
            for j in i + 1..=i + DEFAULT_SENSITIVITY {
                assert!(candles[j].high <= candles[j - 1].high);
            }
        }
    }
}
