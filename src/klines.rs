//! Kline download and the transient CSV the analysis reads back.

use anyhow::{Context, Result, anyhow, bail};
use chrono::DateTime;
use regex::Regex;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::candle::{Candle, deserialize_f64_lenient};
use crate::storage_utils::KlineConfig;
use crate::symbol_info::BINANCE_API;
use crate::timeframe::Timeframe;

const KLINE_KEYS: &[&str] = &[
    "openTime",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "closeTime",
    "quoteAssetVolume",
    "numberOfTrades",
    "takerBuyBaseAssetVolume",
    "takerBuyQuoteAssetVolume",
    "ignore",
];

/// One kline as Binance sends it, with string prices parsed leniently.
#[derive(Deserialize, Debug, Clone)]
pub struct RawKline {
    #[serde(rename = "openTime")]
    pub open_time: i64,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    pub open: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    pub high: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    pub low: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    pub close: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    pub volume: Option<f64>,
}

/// Row layout of the candle CSV. Empty cells mark incomplete rows.
#[derive(Serialize, Deserialize, Debug)]
struct CsvRow {
    unix: Option<i64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    open: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    high: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    low: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    close: Option<f64>,
    #[serde(deserialize_with = "deserialize_f64_lenient")]
    volume: Option<f64>,
}

impl From<&RawKline> for CsvRow {
    fn from(k: &RawKline) -> Self {
        Self {
            unix: Some(k.open_time),
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
        }
    }
}

fn parse_klines(raw: Vec<Vec<Value>>) -> Result<Vec<RawKline>> {
    raw.into_iter()
        .map(|k| {
            let row: Map<String, Value> = KLINE_KEYS
                .iter()
                .zip(k)
                .map(|(&key, val)| (key.to_string(), val))
                .collect();
            serde_json::from_value(Value::Object(row)).context("decoding kline")
        })
        .collect()
}

/// Milliseconds left on an IP ban, parsed from a `-1003` error body.
fn ban_wait_ms(body: &str, now_ms: u64) -> Result<Option<u64>> {
    if !body.contains("-1003") {
        return Ok(None);
    }
    let re = Regex::new(r"until\s+(\d+)")?;
    let ban_until = re
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok());
    Ok(ban_until.filter(|&until| until > now_ms).map(|until| until - now_ms))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Downloads the most recent `config.limit` klines, oldest first.
///
/// A rate-limit ban (418/429 with `-1003`) is waited out and retried up to
/// `config.max_ban_retries` times.
pub async fn fetch_klines(
    client: &Client,
    ticker: &str,
    timeframe: Timeframe,
    config: &KlineConfig,
) -> Result<Vec<RawKline>> {
    let url = format!("{}/klines", BINANCE_API);
    let query = [
        ("symbol", ticker.to_string()),
        ("interval", timeframe.to_string()),
        ("limit", config.limit.to_string()),
    ];

    for attempt in 0..=config.max_ban_retries {
        let response = client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("requesting klines")?;
        let status = response.status();

        if status == StatusCode::IM_A_TEAPOT || status == StatusCode::TOO_MANY_REQUESTS {
            let body = response.text().await.unwrap_or_default();
            match ban_wait_ms(&body, now_ms())? {
                Some(wait_ms) if attempt < config.max_ban_retries => {
                    let wait_sec = (wait_ms as f64 / 1000.0) + 5.0;
                    log::warn!("rate limited by Binance, waiting {:.0}s before retrying", wait_sec);
                    tokio::time::sleep(Duration::from_secs_f64(wait_sec)).await;
                    continue;
                }
                _ => bail!("rate limited by Binance ({}): {}", status, body),
            }
        }

        let raw: Vec<Vec<Value>> = response
            .error_for_status()?
            .json()
            .await
            .context("decoding klines response")?;
        let klines = parse_klines(raw)?;
        log::info!("downloaded {} {} klines for {}", klines.len(), timeframe, ticker);
        return Ok(klines);
    }

    Err(anyhow!("gave up on klines for {} after rate-limit retries", ticker))
}

pub fn csv_path(dir: &Path, ticker: &str) -> PathBuf {
    dir.join(format!("{}.csv", ticker))
}

/// Writes klines newest first, so the head of the file is always the recent window.
pub fn write_csv(path: &Path, klines: &[RawKline]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("creating {:?}", path))?;
    for kline in klines.iter().rev() {
        writer.serialize(CsvRow::from(kline))?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads the `candle_count` most recent complete rows back as an oldest-first window.
pub fn read_csv_window(path: &Path, candle_count: usize) -> Result<Vec<Candle>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b',')
        .from_path(path)
        .with_context(|| format!("opening {:?}", path))?;

    let mut rows = Vec::with_capacity(candle_count);
    for record in reader.deserialize::<CsvRow>().take(candle_count) {
        let row = record?;
        let (Some(unix), Some(open), Some(high), Some(low), Some(close)) =
            (row.unix, row.open, row.high, row.low, row.close)
        else {
            log::debug!("dropping incomplete csv row {:?}", row);
            continue;
        };
        let timestamp = DateTime::from_timestamp_millis(unix)
            .ok_or_else(|| anyhow!("bad timestamp {} in {:?}", unix, path))?;
        rows.push((timestamp, open, high, low, close, row.volume.unwrap_or(0.0)));
    }

    let candles = rows
        .into_iter()
        .rev()
        .enumerate()
        .map(|(index, (timestamp, open, high, low, close, volume))| Candle {
            index,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
        .collect();
    Ok(candles)
}

/// Writes `klines` to `path`, reads the window back and removes the file.
/// The csv work runs on the blocking pool.
async fn persist_and_read(path: PathBuf, klines: Vec<RawKline>, candle_count: usize) -> Result<Vec<Candle>> {
    let csv_file = path.clone();
    let candles = tokio::task::spawn_blocking(move || -> Result<Vec<Candle>> {
        write_csv(&csv_file, &klines)?;
        log::info!("{:?} downloaded and created", csv_file);
        read_csv_window(&csv_file, candle_count)
    })
    .await
    .context("csv task failed")?;

    if let Err(e) = tokio::fs::remove_file(&path).await {
        log::warn!("could not remove {:?}: {}", path, e);
    }
    candles
}

/// Downloads klines, persists them to `<ticker>.csv` in `dir` and loads the analysis window.
/// The CSV is removed again once the window is in memory.
pub async fn load_window(
    client: &Client,
    dir: &Path,
    ticker: &str,
    timeframe: Timeframe,
    config: &KlineConfig,
) -> Result<Vec<Candle>> {
    let klines = fetch_klines(client, ticker, timeframe, config).await?;
    let candles = persist_and_read(csv_path(dir, ticker), klines, config.candle_count).await?;
    if candles.is_empty() {
        bail!("no complete candles returned for {} {}", ticker, timeframe);
    }
    Ok(candles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<RawKline> {
        let body = r#"[
            [1700000000000,"10.0","12.0","9.0","11.0","100.5",1700086399999,"0",1,"0","0","0"],
            [1700086400000,"11.0","13.0","10.0","12.5","80.0",1700172799999,"0",1,"0","0","0"],
            [1700172800000,"12.5","14.0","","13.0","70.0",1700259199999,"0",1,"0","0","0"],
            [1700259200000,"13.0","15.0","12.0","14.0","60.0",1700345599999,"0",1,"0","0","0"]
        ]"#;
        let raw: Vec<Vec<Value>> = serde_json::from_str(body).unwrap();
        parse_klines(raw).unwrap()
    }

    #[test]
    fn test_parse_binance_klines() {
        let klines = sample();
        assert_eq!(klines.len(), 4);
        assert_eq!(klines[0].open_time, 1_700_000_000_000);
        assert_eq!(klines[1].close, Some(12.5));
        assert_eq!(klines[2].low, None);
    }

    #[test]
    fn test_csv_window_is_recent_and_oldest_first() {
        let path = std::env::temp_dir().join(format!("sup-res-klines-{}.csv", std::process::id()));
        write_csv(&path, &sample()).unwrap();

        let all = read_csv_window(&path, 10).unwrap();
        // The row with the missing low is dropped and indices are contiguous.
        assert_eq!(all.len(), 3);
        assert_eq!(all.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(all[0].close, 11.0);
        assert_eq!(all[2].close, 14.0);
        assert!(all[0].timestamp < all[2].timestamp);

        let recent = read_csv_window(&path, 2).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].close, 14.0);

        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn test_persist_and_read_removes_csv() {
        let path = std::env::temp_dir().join(format!("sup-res-persist-{}.csv", std::process::id()));
        let candles = persist_and_read(path.clone(), sample(), 10).await.unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(candles[2].close, 14.0);
        assert!(!path.exists());
    }

    #[test]
    fn test_ban_wait_parsing() {
        let body = r#"{"code":-1003,"msg":"Way too many requests; IP banned until 1700000060000."}"#;
        assert_eq!(ban_wait_ms(body, 1_700_000_000_000).unwrap(), Some(60_000));
        assert_eq!(ban_wait_ms(body, 1_700_000_070_000).unwrap(), None);
        assert_eq!(ban_wait_ms(r#"{"code":-1121}"#, 0).unwrap(), None);
    }
}
