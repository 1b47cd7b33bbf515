//! The analysis pipeline shared by the chart and bot entry points.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::path::Path;
use std::time::Instant;

use crate::candle::Candle;
use crate::candle_patterns::{self, PatternMatch};
use crate::fibonacci::{self, FibonacciLevel};
use crate::indicators::{self, IndicatorSet};
use crate::klines;
use crate::levels::{self, LevelBucket};
use crate::pivots::{self, PivotScan};
use crate::storage_utils::{AnalysisConfig, AppConfig};
use crate::symbol_info;
use crate::timeframe::Timeframe;

/// Everything the renderers and the publisher need for one chart.
#[derive(Serialize, Debug, Clone)]
pub struct ChartReport {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub sensitivity: usize,
    pub candles: Vec<Candle>,
    pub pivots: PivotScan,
    pub levels: LevelBucket,
    pub fibonacci: Vec<FibonacciLevel>,
    pub indicators: IndicatorSet,
    pub patterns: Vec<PatternMatch>,
}

impl ChartReport {
    pub fn latest_close(&self) -> f64 {
        self.levels.latest_close
    }

    /// Open time of the latest candle, used to date captions and file names.
    pub fn as_of(&self) -> DateTime<Utc> {
        self.candles.last().map(|c| c.timestamp).unwrap_or_default()
    }
}

/// Runs pivots, level classification, Fibonacci, indicators and patterns over a
/// loaded window. Fails on an empty window or out-of-range analysis settings.
pub fn analyze(
    ticker: &str,
    timeframe: Timeframe,
    candles: Vec<Candle>,
    config: &AnalysisConfig,
) -> Result<ChartReport> {
    config.validate()?;
    let pivots = pivots::detect_pivots(&candles, config.before_count, config.sensitivity);
    if pivots.is_empty() {
        log::warn!(
            "{} {}: no pivots at sensitivity {}, levels fall back to the window range",
            ticker,
            timeframe,
            config.sensitivity
        );
    }
    let levels = levels::classify_levels(&pivots, &candles)
        .with_context(|| format!("classifying levels for {} {}", ticker, timeframe))?;
    let fibonacci = fibonacci::fibonacci_levels(
        levels.highest_resistance,
        levels.lowest_support,
        fibonacci::multipliers(config.extended_fibonacci),
    );
    let indicators = indicators::compute(&candles, config)?;
    let patterns = if timeframe.is_high() {
        candle_patterns::recent_patterns(&candles, config.pattern_lookback)
    } else {
        Vec::new()
    };

    log::info!(
        "{} {}: {} supports, {} resistances, range {} - {}, {} patterns",
        ticker,
        timeframe,
        pivots.supports.len(),
        pivots.resistances.len(),
        levels.lowest_support,
        levels.highest_resistance,
        patterns.len()
    );

    Ok(ChartReport {
        ticker: ticker.to_string(),
        timeframe,
        sensitivity: config.sensitivity,
        candles,
        pivots,
        levels,
        fibonacci,
        indicators,
        patterns,
    })
}

/// Runs the full pipeline:
/// 1. Validates the ticker against exchange info while downloading its klines.
/// 2. Persists the klines to a transient CSV in `work_dir` and reads the window back.
/// 3. Analyses the window.
pub async fn run_analysis_pipeline(config: &AppConfig, work_dir: &Path) -> Result<ChartReport> {
    let started = Instant::now();
    let client = Client::builder().build()?;
    let ticker = config.ticker.to_uppercase();

    // Step 1 & 2: Metadata and candles
    let (_, candles) = futures::try_join!(
        symbol_info::fetch_symbol_info(&client, &ticker),
        klines::load_window(&client, work_dir, &ticker, config.timeframe, &config.klines),
    )?;

    // Step 3: Analyze Data
    let report = analyze(&ticker, config.timeframe, candles, &config.analysis)?;
    log::info!("completed analysis in {:.2?}", started.elapsed());
    Ok(report)
}
