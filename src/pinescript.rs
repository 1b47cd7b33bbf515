use anyhow::{Context, Result};
use std::path::Path;

use crate::analysis::ChartReport;

const MAX_LINES_PER_SIDE: usize = 10;

fn header(ticker: &str, timeframe: &str) -> String {
    format!(
        "//@version=5\nindicator('Sup-Res {ticker} {timeframe}', overlay=true)\n\
         plot(ta.sma(close, 50), title='50 SMA', color=color.new(color.blue, 0), linewidth=1)\n\
         plot(ta.sma(close, 100), title='100 SMA', color=color.new(color.purple, 0), linewidth=1)\n\
         plot(ta.sma(close, 200), title='200 SMA', color=color.new(color.red, 0), linewidth=1)\n"
    )
}

fn hline(price: f64, color: &str) -> String {
    format!("hline({price}, title=\"Lines\", color=color.{color}, linestyle=hline.style_solid, linewidth=1)")
}

/// TradingView overlay with the SMA plots and one horizontal line per level.
/// Zero placeholders are skipped.
pub fn render(report: &ChartReport) -> String {
    let resistances = report.levels.resistances();
    let supports = report.levels.supports();

    let lines: Vec<String> = resistances
        .iter()
        .take(MAX_LINES_PER_SIDE)
        .filter(|&&p| p != 0.0)
        .map(|&p| hline(p, "red"))
        .chain(
            supports
                .iter()
                .take(MAX_LINES_PER_SIDE)
                .filter(|&&p| p != 0.0)
                .map(|&p| hline(p, "green")),
        )
        .collect();

    header(&report.ticker, report.timeframe.as_str()) + &lines.join("\n")
}

pub fn write(report: &ChartReport, dir: &Path) -> Result<()> {
    let path = dir.join("pinescript.txt");
    std::fs::write(&path, render(report)).with_context(|| format!("writing {:?}", path))?;
    log::info!("pine script written to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::candle::fixtures;
    use crate::storage_utils::AnalysisConfig;
    use crate::timeframe::Timeframe;

    #[test]
    fn test_pinescript_lines() {
        let lows = [100.0, 98.0, 96.0, 95.0, 97.0, 99.0, 101.0, 100.0];
        let candles = fixtures::from_lows(&lows, 4.0);
        let report = analyze("BTCUSDT", Timeframe::H4, candles, &AnalysisConfig::default()).unwrap();
        let script = render(&report);

        assert!(script.starts_with("//@version=5\nindicator('Sup-Res BTCUSDT 4h', overlay=true)\n"));
        assert!(script.contains(
            "hline(105, title=\"Lines\", color=color.red, linestyle=hline.style_solid, linewidth=1)"
        ));
        assert!(script.contains("hline(95, title=\"Lines\", color=color.green"));
        assert_eq!(script.matches("hline(").count(), 2);
    }

    #[test]
    fn test_zero_levels_skipped() {
        let lows = [100.0, 98.0, 96.0, 95.0, 97.0, 99.0, 101.0, 100.0];
        let candles = fixtures::from_lows(&lows, 4.0);
        let mut report = analyze("BTCUSDT", Timeframe::H4, candles, &AnalysisConfig::default()).unwrap();
        report.levels.support_above.push(0.0);
        assert_eq!(render(&report).matches("hline(").count(), 2);
    }
}
