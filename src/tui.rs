use anyhow::Result;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    prelude::*,
    symbols::Marker,
    text::Line,
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, GraphType, Paragraph, Sparkline},
};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::analysis::{self, ChartReport};
use crate::candle::Candle;
use crate::legend::price_precision;
use crate::storage_utils::AppConfig;

const SUPPORT_COLOR: Color = Color::Rgb(32, 178, 170);
const RESISTANCE_COLOR: Color = Color::Rgb(147, 112, 219);
const SMA_COLORS: [Color; 3] = [Color::Rgb(92, 108, 255), Color::Rgb(149, 15, 186), Color::Rgb(166, 155, 5)];
const FIB_COLOR: Color = Color::DarkGray;
const VOLUME_COLOR: Color = Color::Rgb(70, 130, 180);
// Sparkline bars are integers; volumes are rescaled to this height first.
const VOLUME_SCALE: f64 = 1000.0;
const LEGEND_ROWS: usize = 12;

// --- App State ---

struct App {
    report: ChartReport,
    config: AppConfig,
    work_dir: PathBuf,
    is_refreshing: bool,
    show_uptrend: bool,
    status: Option<String>,
}

impl App {
    fn new(report: ChartReport, config: AppConfig, work_dir: PathBuf) -> Self {
        Self {
            report,
            config,
            work_dir,
            is_refreshing: false,
            show_uptrend: true,
            status: None,
        }
    }

    fn set_report(&mut self, report: ChartReport) {
        self.report = report;
        self.is_refreshing = false;
        self.status = None;
    }

    /// Re-runs the analysis on the loaded candles with a different sensitivity.
    fn set_sensitivity(&mut self, sensitivity: usize) {
        self.config.analysis.sensitivity = sensitivity;
        match analysis::analyze(
            &self.report.ticker,
            self.report.timeframe,
            self.report.candles.clone(),
            &self.config.analysis,
        ) {
            Ok(report) => self.set_report(report),
            Err(e) => self.status = Some(format!("{:#}", e)),
        }
    }
}

// --- TUI ---

pub async fn run_tui(report: ChartReport, config: AppConfig, work_dir: PathBuf) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Log lines on stderr would draw over the alternate screen.
    let log_level = log::max_level();
    log::set_max_level(log::LevelFilter::Off);
    let res = run_app(&mut terminal, App::new(report, config, work_dir)).await;
    log::set_max_level(log_level);

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    res
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> Result<()> {
    let (data_tx, mut data_rx) = mpsc::channel::<Result<ChartReport>>(1);

    loop {
        terminal.draw(|f| ui(f, &app))?;

        if let Ok(result) = data_rx.try_recv() {
            match result {
                Ok(report) => app.set_report(report),
                Err(e) => {
                    app.is_refreshing = false;
                    app.status = Some(format!("Refresh failed: {}", e));
                }
            }
        }

        if event::poll(Duration::from_millis(50))? {
            // Resize needs no handling: the next draw picks up the new size.
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !handle_key_event(key, &mut app, &data_tx) {
                    return Ok(());
                }
            }
        }
    }
}

fn handle_key_event(key: KeyEvent, app: &mut App, tx: &mpsc::Sender<Result<ChartReport>>) -> bool {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => return false,
        KeyCode::F(5) if !app.is_refreshing => {
            app.is_refreshing = true;
            let tx_clone = tx.clone();
            let config = app.config.clone();
            let work_dir = app.work_dir.clone();
            tokio::spawn(async move {
                let result = analysis::run_analysis_pipeline(&config, &work_dir).await;
                let _ = tx_clone.send(result).await;
            });
        }
        KeyCode::Char('f') => app.show_uptrend = !app.show_uptrend,
        KeyCode::Char(c @ '1'..='3') if !app.is_refreshing => {
            let sensitivity = c.to_digit(10).unwrap_or(2) as usize;
            if sensitivity != app.report.sensitivity {
                app.set_sensitivity(sensitivity);
            }
        }
        _ => {}
    }
    true
}

// --- Chart data ---

fn horizontal(from_x: f64, to_x: f64, price: f64) -> Vec<(f64, f64)> {
    vec![(from_x, price), (to_x, price)]
}

/// Point series and line segments for the price panel, owned so datasets can borrow them.
struct PriceSeries {
    closes: Vec<(f64, f64)>,
    smas: Vec<(String, Vec<(f64, f64)>)>,
    supports: Vec<Vec<(f64, f64)>>,
    resistances: Vec<Vec<(f64, f64)>>,
    pivots: Vec<(f64, f64)>,
    fibonacci: Vec<Vec<(f64, f64)>>,
    x_max: f64,
    y_bounds: [f64; 2],
}

fn price_series(app: &App) -> PriceSeries {
    let report = &app.report;
    let x_max = report.candles.len() as f64 + 5.0;

    let closes = report.candles.iter().map(|c| (c.index as f64, c.close)).collect();
    let smas = report
        .indicators
        .smas
        .iter()
        .map(|sma| {
            let points = sma
                .values
                .iter()
                .enumerate()
                .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
                .collect();
            (format!("SMA{}", sma.length), points)
        })
        .collect();

    let line_from = |index: usize| index.saturating_sub(1) as f64;
    let supports = report
        .pivots
        .supports
        .iter()
        .map(|p| horizontal(line_from(p.index), x_max, p.price))
        .collect();
    let resistances = report
        .pivots
        .resistances
        .iter()
        .map(|p| horizontal(line_from(p.index), x_max, p.price))
        .collect();
    let pivots = report
        .pivots
        .supports
        .iter()
        .chain(&report.pivots.resistances)
        .map(|p| (p.index as f64, p.price))
        .collect();

    let fib_prices: Vec<f64> = report
        .fibonacci
        .iter()
        .map(|f| if app.show_uptrend { f.uptrend_price } else { f.downtrend_price })
        .collect();
    let fibonacci = fib_prices.iter().map(|&p| horizontal(0.0, x_max, p)).collect();

    let (mut y_min, mut y_max) = report
        .candles
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| (lo.min(c.low), hi.max(c.high)));
    for &p in &fib_prices {
        y_min = y_min.min(p);
        y_max = y_max.max(p);
    }
    let pad = ((y_max - y_min) * 0.05).max(f64::EPSILON);

    PriceSeries {
        closes,
        smas,
        supports,
        resistances,
        pivots,
        fibonacci,
        x_max,
        y_bounds: [y_min - pad, y_max + pad],
    }
}

fn x_labels(app: &App) -> Vec<Span<'static>> {
    let candles = &app.report.candles;
    let format = app.report.timeframe.label_format();
    let picks = [0, candles.len() / 2, candles.len().saturating_sub(1)];
    picks
        .iter()
        .filter_map(|&i| candles.get(i))
        .map(|c| Span::raw(c.timestamp.format(format).to_string()))
        .collect()
}

/// Volumes of the last `width` completed candles, rescaled against the tallest bar.
fn volume_bars(candles: &[Candle], width: usize) -> Vec<u64> {
    let completed = &candles[..candles.len().saturating_sub(1)];
    let shown = &completed[completed.len().saturating_sub(width)..];
    let max = shown.iter().map(|c| c.volume).fold(0.0, f64::max);
    if max <= 0.0 {
        return vec![0; shown.len()];
    }
    shown
        .iter()
        .map(|c| (c.volume.max(0.0) / max * VOLUME_SCALE).round() as u64)
        .collect()
}

fn y_labels(bounds: [f64; 2], precision: usize) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::raw(format!("{:.*}", precision, v)))
        .collect()
}

// --- Rendering ---

fn ui(f: &mut Frame, app: &App) {
    let main_layout = Layout::horizontal([Constraint::Min(40), Constraint::Length(38)]).split(f.size());
    let chart_chunks = Layout::vertical([
        Constraint::Length(3),
        Constraint::Percentage(65),
        Constraint::Length(6),
        Constraint::Min(6),
    ])
    .split(main_layout[0]);

    let report = &app.report;
    let precision = price_precision(report.candles.first().map_or(1.0, |c| c.close));

    let title = format!(
        "{} {} Chart | last close {:.*} | sensitivity {} | {} Fibonacci",
        report.ticker,
        report.timeframe.as_str().to_uppercase(),
        precision,
        report.latest_close(),
        report.sensitivity,
        if app.show_uptrend { "uptrend" } else { "downtrend" },
    );
    let status = app.status.clone().unwrap_or_else(|| {
        format!("Data taken at {} UTC", report.as_of().format("%d-%m-%Y %H:%M"))
    });
    f.render_widget(
        Paragraph::new(status)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(title).title_alignment(Alignment::Center)),
        chart_chunks[0],
    );

    render_price_chart(f, app, chart_chunks[1], precision);
    render_volume(f, app, chart_chunks[2]);
    render_rsi_chart(f, app, chart_chunks[3]);
    render_legend(f, app, main_layout[1], precision);

    if app.is_refreshing {
        let area = centered_rect(60, 20, main_layout[0]);
        f.render_widget(Clear, area);
        f.render_widget(
            Paragraph::new("Downloading candles and re-running analysis...\nPlease wait.")
                .block(Block::default().title("Refreshing").borders(Borders::ALL))
                .alignment(Alignment::Center),
            area,
        );
    }
}

fn render_price_chart(f: &mut Frame, app: &App, area: Rect, precision: usize) {
    let series = price_series(app);

    let mut datasets = vec![
        Dataset::default()
            .name("Close")
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::White))
            .data(&series.closes),
    ];
    for ((name, points), color) in series.smas.iter().zip(SMA_COLORS) {
        datasets.push(
            Dataset::default()
                .name(name.clone())
                .marker(Marker::Braille)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(points),
        );
    }
    let lines = series
        .fibonacci
        .iter()
        .map(|l| (l, FIB_COLOR))
        .chain(series.supports.iter().map(|l| (l, SUPPORT_COLOR)))
        .chain(series.resistances.iter().map(|l| (l, RESISTANCE_COLOR)));
    for (line, color) in lines {
        datasets.push(
            Dataset::default()
                .marker(Marker::Dot)
                .graph_type(GraphType::Line)
                .style(Style::default().fg(color))
                .data(line),
        );
    }
    datasets.push(
        Dataset::default()
            .marker(Marker::Block)
            .graph_type(GraphType::Scatter)
            .style(Style::default().fg(Color::Yellow))
            .data(&series.pivots),
    );

    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title("Price"))
        .x_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, series.x_max])
                .labels(x_labels(app)),
        )
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds(series.y_bounds)
                .labels(y_labels(series.y_bounds, precision)),
        );
    f.render_widget(chart, area);
}

fn render_volume(f: &mut Frame, app: &App, area: Rect) {
    let candles = &app.report.candles;
    let inner_width = usize::from(area.width.saturating_sub(2));
    let bars = volume_bars(candles, inner_width);
    let title = match candles.len().checked_sub(2).and_then(|i| candles.get(i)) {
        Some(c) => format!("Volume {:.2}", c.volume),
        None => "Volume".to_string(),
    };
    f.render_widget(
        Sparkline::default()
            .block(Block::default().borders(Borders::ALL).title(title))
            .data(&bars)
            .style(Style::default().fg(VOLUME_COLOR)),
        area,
    );
}

fn render_rsi_chart(f: &mut Frame, app: &App, area: Rect) {
    let report = &app.report;
    let x_max = report.candles.len() as f64 + 5.0;
    let rsi: Vec<(f64, f64)> = report
        .indicators
        .rsi
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i as f64, v)))
        .collect();
    let lower = horizontal(0.0, x_max, 30.0);
    let upper = horizontal(0.0, x_max, 70.0);

    fn band(data: &[(f64, f64)]) -> Dataset<'_> {
        Dataset::default()
            .marker(Marker::Dot)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Red))
            .data(data)
    }
    let datasets = vec![
        band(&lower),
        band(&upper),
        Dataset::default()
            .marker(Marker::Braille)
            .graph_type(GraphType::Line)
            .style(Style::default().fg(Color::Cyan))
            .data(&rsi),
    ];

    let title = match report.indicators.last_rsi() {
        Some(v) => format!("RSI {:.0}", v),
        None => "RSI".to_string(),
    };
    let chart = Chart::new(datasets)
        .block(Block::default().borders(Borders::ALL).title(title))
        .x_axis(Axis::default().bounds([0.0, x_max]))
        .y_axis(
            Axis::default()
                .style(Style::default().fg(Color::Gray))
                .bounds([0.0, 100.0])
                .labels(vec![Span::raw("30"), Span::raw("70")]),
        );
    f.render_widget(chart, area);
}

fn render_legend(f: &mut Frame, app: &App, area: Rect, precision: usize) {
    let report = &app.report;
    let mut lines: Vec<Line> = vec![Line::from(vec![
        Span::styled("Resistances", Style::default().fg(RESISTANCE_COLOR)),
        Span::raw("  ||  "),
        Span::styled("Supports", Style::default().fg(SUPPORT_COLOR)),
    ])];

    let resistances = report.levels.resistances();
    let supports = report.levels.supports();
    let rows = resistances.len().max(supports.len()).min(LEGEND_ROWS);
    let cell = |v: Option<&f64>| v.map_or_else(|| " ".repeat(11), |p| format!("{:>11.*}", precision, p));
    for i in 0..rows {
        lines.push(Line::from(vec![
            Span::styled(cell(resistances.get(i)), Style::default().fg(RESISTANCE_COLOR)),
            Span::raw("  ||  "),
            Span::styled(cell(supports.get(i)), Style::default().fg(SUPPORT_COLOR)),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from("Indicators").style(Style::default().add_modifier(Modifier::BOLD)));
    if let Some(rsi) = report.indicators.last_rsi() {
        lines.push(Line::from(format!("RSI        : {:.0}", rsi)));
    }
    if let Some(macd) = report.indicators.last_macd() {
        lines.push(Line::from(format!("MACD hist  : {:.*}", precision + 1, macd.histogram)));
    }
    for (sma, color) in report.indicators.smas.iter().zip(SMA_COLORS) {
        if let Some(v) = sma.last() {
            lines.push(
                Line::from(format!("{:<11}: {:.*}", format!("SMA{}", sma.length), precision + 1, v))
                    .style(Style::default().fg(color)),
            );
        }
    }

    lines.push(Line::from(""));
    lines.push(Line::from("Fibonacci Uptrend | Downtrend").style(Style::default().add_modifier(Modifier::BOLD)));
    for level in report.fibonacci.iter().rev() {
        lines.push(Line::from(format!(
            "Fib {:.3} : {:.*} | {:.*}",
            level.multiplier,
            precision + 1,
            level.uptrend_price,
            precision + 1,
            level.downtrend_price
        )));
    }

    if !report.patterns.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from("Latest Candlestick Patterns").style(Style::default().add_modifier(Modifier::BOLD)));
        for found in &report.patterns {
            lines.push(Line::from(format!(
                "{} : {}",
                found.timestamp.format("%b-%d-%y"),
                found.pattern.name()
            )));
        }
    }

    let legend_chunks = Layout::vertical([Constraint::Min(1), Constraint::Length(3)]).split(area);
    f.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Levels")),
        legend_chunks[0],
    );
    f.render_widget(
        Paragraph::new("q quit | f fib trend\n1-3 sensitivity | F5 refresh")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP)),
        legend_chunks[1],
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::vertical([
        Constraint::Percentage((100 - percent_y) / 2),
        Constraint::Percentage(percent_y),
        Constraint::Percentage((100 - percent_y) / 2),
    ])
    .split(r);
    Layout::horizontal([
        Constraint::Percentage((100 - percent_x) / 2),
        Constraint::Percentage(percent_x),
        Constraint::Percentage((100 - percent_x) / 2),
    ])
    .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::candle::fixtures;
    use crate::storage_utils::AnalysisConfig;
    use crate::timeframe::Timeframe;
    use crossterm::event::KeyModifiers;
    use ratatui::backend::TestBackend;

    fn app() -> App {
        let lows = [100.0, 98.0, 96.0, 95.0, 97.0, 99.0, 101.0, 104.0, 103.0, 102.0, 101.0];
        let candles = fixtures::from_lows(&lows, 4.0);
        let report = analyze("BTCUSDT", Timeframe::D1, candles, &AnalysisConfig::default()).unwrap();
        App::new(report, AppConfig::default(), std::env::temp_dir())
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn test_keys_toggle_and_quit() {
        let mut app = app();
        let (tx, _rx) = mpsc::channel(1);
        assert!(handle_key_event(press(KeyCode::Char('f')), &mut app, &tx));
        assert!(!app.show_uptrend);
        assert!(!handle_key_event(press(KeyCode::Char('q')), &mut app, &tx));
    }

    #[test]
    fn test_sensitivity_key_reanalyses() {
        let mut app = app();
        let (tx, _rx) = mpsc::channel(1);
        assert_eq!(app.report.sensitivity, 2);
        handle_key_event(press(KeyCode::Char('1')), &mut app, &tx);
        assert_eq!(app.report.sensitivity, 1);
        assert_eq!(app.config.analysis.sensitivity, 1);
    }

    #[test]
    fn test_price_bounds_cover_fibonacci() {
        let app = app();
        let series = price_series(&app);
        assert_eq!(series.closes.len(), 11);
        assert_eq!(series.supports.len(), app.report.pivots.supports.len());
        for level in &app.report.fibonacci {
            assert!(level.uptrend_price >= series.y_bounds[0]);
            assert!(level.uptrend_price <= series.y_bounds[1]);
        }
    }

    #[test]
    fn test_volume_bars_skip_forming_candle() {
        let mut candles = fixtures::from_lows(&[10.0, 9.0, 8.0, 9.0, 10.0], 2.0);
        for (c, volume) in candles.iter_mut().zip([5.0, 10.0, 2.5, 0.0, 99.0]) {
            c.volume = volume;
        }
        assert_eq!(volume_bars(&candles, 80), vec![500, 1000, 250, 0]);
        assert_eq!(volume_bars(&candles, 2), vec![1000, 0]);
        assert!(volume_bars(&[], 80).is_empty());
    }

    #[test]
    fn test_draws_without_panicking() {
        let app = app();
        let mut terminal = Terminal::new(TestBackend::new(140, 45)).unwrap();
        terminal.draw(|f| ui(f, &app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let text: String = buffer.content().iter().map(|c| c.symbol()).collect();
        assert!(text.contains("BTCUSDT 1D Chart"));
        assert!(text.contains("Volume 1.00"));
        assert!(text.contains("RSI"));
        assert!(text.contains("Resistances"));
    }
}
