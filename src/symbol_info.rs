use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::Deserialize;

pub const BINANCE_API: &str = "https://api.binance.com/api/v3";

const DEFAULT_WEIGHT_LIMIT: u32 = 6000;

#[derive(Deserialize, Debug, Clone)]
pub struct RateLimit {
    #[serde(rename = "rateLimitType")]
    pub limit_type: String,
    pub interval: String,
    pub limit: u32,
}

#[derive(Deserialize, Debug, Clone)]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    #[serde(rename = "baseAsset")]
    pub base_asset: String,
    #[serde(rename = "quoteAsset")]
    pub quote_asset: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ExchangeInfo {
    #[serde(rename = "rateLimits", default)]
    pub rate_limits: Vec<RateLimit>,
    #[serde(default)]
    pub symbols: Vec<SymbolInfo>,
}

impl ExchangeInfo {
    /// Per-minute request weight budget, falling back to the documented spot default.
    pub fn weight_per_minute(&self) -> u32 {
        self.rate_limits
            .iter()
            .find(|r| r.limit_type == "REQUEST_WEIGHT" && r.interval == "MINUTE")
            .map(|r| r.limit)
            .unwrap_or(DEFAULT_WEIGHT_LIMIT)
    }

    /// The entry for `ticker`, provided it is currently tradable.
    pub fn tradable(&self, ticker: &str) -> Result<&SymbolInfo> {
        let Some(info) = self.symbols.iter().find(|s| s.symbol == ticker) else {
            bail!("{} is not listed on Binance", ticker);
        };
        if info.status != "TRADING" {
            bail!("{} is listed but not trading (status {})", ticker, info.status);
        }
        Ok(info)
    }
}

/// Fetches exchange info for a single symbol and checks that it can be charted.
pub async fn fetch_symbol_info(client: &Client, ticker: &str) -> Result<ExchangeInfo> {
    let response = client
        .get(format!("{}/exchangeInfo", BINANCE_API))
        .query(&[("symbol", ticker)])
        .send()
        .await
        .context("requesting exchange info")?;

    if response.status() == reqwest::StatusCode::BAD_REQUEST {
        bail!("{} is not a valid Binance symbol", ticker);
    }

    let info: ExchangeInfo = response
        .error_for_status()?
        .json()
        .await
        .context("decoding exchange info")?;

    let symbol = info.tradable(ticker)?;
    log::info!(
        "{} ({}/{}) is trading, weight budget {}/min",
        symbol.symbol,
        symbol.base_asset,
        symbol.quote_asset,
        info.weight_per_minute()
    );
    Ok(info)
}
