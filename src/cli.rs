use clap::{Parser, ValueEnum};

use crate::storage_utils::AppConfig;
use crate::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// Interactive terminal chart.
    #[default]
    Chart,
    /// Print the legend tables and exit.
    Legend,
    /// Write output.txt, pinescript.txt and levels.json, then post if configured.
    Bot,
}

#[derive(Debug, Clone, PartialEq, Parser)]
#[command(name = "supres", version, about)]
pub struct CliArgs {
    /// What to do with the analysed window.
    #[arg(value_enum, default_value_t = Mode::Chart)]
    pub mode: Mode,
    /// Binance pair, e.g. BTCUSDT. Defaults to the stored config.
    #[arg(value_parser = parse_ticker)]
    pub ticker: Option<String>,
    /// Binance interval: 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w.
    pub timeframe: Option<Timeframe>,
    /// Candles on each side of a pivot.
    #[arg(long, short, value_parser = clap::value_parser!(u8).range(1..=3))]
    pub sens: Option<u8>,
}

fn parse_ticker(raw: &str) -> Result<String, String> {
    let ticker = raw.trim().to_uppercase();
    if ticker.is_empty() || !ticker.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("'{}' is not a Binance pair", raw));
    }
    Ok(ticker)
}

impl CliArgs {
    /// Command-line values override the stored config for this run only.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(ticker) = &self.ticker {
            config.ticker = ticker.clone();
        }
        if let Some(timeframe) = self.timeframe {
            config.timeframe = timeframe;
        }
        if let Some(sens) = self.sens {
            config.analysis.sensitivity = usize::from(sens);
        }
    }
}
