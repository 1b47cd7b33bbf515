//! Terminal legend: levels, indicators, Fibonacci and patterns as comfy tables.

use anyhow::Result;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::analysis::ChartReport;

const MAX_LEVEL_ROWS: usize = 12;

const SUPPORT_COLOR: Color = Color::Rgb { r: 32, g: 178, b: 170 };
const RESISTANCE_COLOR: Color = Color::Rgb { r: 147, g: 112, b: 219 };
const LEGEND_COLOR: Color = Color::Rgb { r: 216, g: 216, b: 216 };

/// Decimal places for prices of this asset: 2 for anything quoted at 1 or more,
/// otherwise one less than the printed length of the sample price.
pub fn price_precision(sample_price: f64) -> usize {
    if sample_price >= 1.0 {
        return 2;
    }
    sample_price.to_string().len().saturating_sub(1).max(2)
}

fn new_table(headers: Vec<Cell>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers);
    table
}

fn header(text: &str) -> Cell {
    Cell::new(text).add_attribute(Attribute::Bold)
}

/// Resistances (lowest first) beside supports (highest first), padded to equal length.
pub fn levels_table(report: &ChartReport, precision: usize) -> Table {
    let mut table = new_table(vec![
        header("Resistances").fg(RESISTANCE_COLOR).set_alignment(CellAlignment::Right),
        header("Supports").fg(SUPPORT_COLOR).set_alignment(CellAlignment::Right),
    ]);

    let resistances = report.levels.resistances();
    let supports = report.levels.supports();
    let rows = resistances.len().max(supports.len()).min(MAX_LEVEL_ROWS);

    let cell = |level: Option<&f64>, color: Color| match level {
        Some(price) => Cell::new(format!("{:.*}", precision, price))
            .fg(color)
            .set_alignment(CellAlignment::Right),
        None => Cell::new(""),
    };
    for i in 0..rows {
        table.add_row(vec![
            cell(resistances.get(i), RESISTANCE_COLOR),
            cell(supports.get(i), SUPPORT_COLOR),
        ]);
    }
    table
}

pub fn indicators_table(report: &ChartReport, precision: usize) -> Table {
    let mut table = new_table(vec![header("Indicator"), header("Value").set_alignment(CellAlignment::Right)]);
    let value = |v: Option<f64>, digits: usize| {
        Cell::new(v.map_or_else(|| "n/a".to_string(), |v| format!("{:.*}", digits, v)))
            .fg(LEGEND_COLOR)
            .set_alignment(CellAlignment::Right)
    };

    let indicators = &report.indicators;
    table.add_row(vec![Cell::new("RSI"), value(indicators.last_rsi(), 0)]);
    table.add_row(vec![
        Cell::new("MACD histogram"),
        value(indicators.last_macd().map(|m| m.histogram), precision + 1),
    ]);
    for sma in &indicators.smas {
        table.add_row(vec![Cell::new(format!("SMA{}", sma.length)), value(sma.last(), precision + 1)]);
    }
    table
}

/// Fibonacci levels, highest multiplier first.
pub fn fibonacci_table(report: &ChartReport, precision: usize) -> Table {
    let mut table = new_table(vec![
        header("Fib"),
        header("Uptrend").set_alignment(CellAlignment::Right),
        header("Downtrend").set_alignment(CellAlignment::Right),
    ]);
    for level in report.fibonacci.iter().rev() {
        table.add_row(vec![
            Cell::new(format!("{:.3}", level.multiplier)).fg(Color::DarkGrey),
            Cell::new(format!("{:.*}", precision + 1, level.uptrend_price)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.*}", precision + 1, level.downtrend_price)).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}

pub fn patterns_table(report: &ChartReport) -> Table {
    let mut table = new_table(vec![header("Date"), header("Latest Candlestick Patterns")]);
    for found in &report.patterns {
        table.add_row(vec![
            Cell::new(found.timestamp.format("%b-%d-%y")).fg(Color::DarkGrey),
            Cell::new(found.pattern.name()),
        ]);
    }
    table
}

/// The whole legend as printable text.
pub fn render(report: &ChartReport) -> String {
    let sample_price = report.candles.first().map_or(1.0, |c| c.close);
    let precision = price_precision(sample_price);
    let title = format!(
        "{} {} Chart (Data taken at {} UTC, sensitivity {})",
        report.ticker,
        report.timeframe.as_str().to_uppercase(),
        report.as_of().format("%d-%m-%Y %H:%M"),
        report.sensitivity
    );

    let mut sections = vec![
        title,
        levels_table(report, precision).to_string(),
        indicators_table(report, precision).to_string(),
        fibonacci_table(report, precision).to_string(),
    ];
    if !report.patterns.is_empty() {
        sections.push(patterns_table(report).to_string());
    }
    sections.join("\n\n")
}

pub fn run(report: &ChartReport) -> Result<()> {
    if let Err(e) = clearscreen::clear() {
        log::debug!("could not clear screen: {}", e);
    }
    println!("\n{}\n", render(report));
    Ok(())
}
