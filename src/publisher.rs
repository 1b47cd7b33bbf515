//! Output files for the bot pipeline and optional Telegram posting.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::ChartReport;
use crate::storage_utils::{AsyncStorageManager, PublisherConfig};

const CAPTION_LEVELS: usize = 7;

/// Caption shared by `output.txt` and the Telegram post.
pub fn caption(report: &ChartReport) -> String {
    let resistances: Vec<f64> = report.levels.resistances().into_iter().take(CAPTION_LEVELS).collect();
    let supports: Vec<f64> = report.levels.supports().into_iter().take(CAPTION_LEVELS).collect();
    format!(
        "{} {} {}\n Support and resistance levels:\nRes={:?} \nSup={:?}",
        report.ticker,
        report.as_of().format("%b-%d-%Y"),
        report.timeframe.as_str().to_uppercase(),
        resistances,
        supports
    )
}

/// Saves the report as `levels.json` and writes `output.txt` (report path, then caption).
pub async fn write_outputs(
    report: &ChartReport,
    storage: &AsyncStorageManager,
    output_dir: &Path,
) -> Result<PathBuf> {
    storage.save("levels", report).await?;
    let report_path = storage.path_for("levels");

    let output_path = output_dir.join("output.txt");
    let body = format!("{}\n{}", report_path.display(), caption(report));
    tokio::fs::write(&output_path, body)
        .await
        .with_context(|| format!("writing {:?}", output_path))?;
    log::info!("chart text written to {:?}", output_path);
    Ok(output_path)
}

/// Runs `op` until it succeeds, at most `attempts` times, sleeping `delay` in between.
pub async fn with_retries<T, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_err = anyhow!("no attempts made");
    for attempt in 1..=attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::warn!("attempt {}/{} failed: {:#}", attempt, attempts, e);
                last_err = e;
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }
    Err(last_err)
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<TelegramMessage>,
}

#[derive(Deserialize, Debug)]
struct TelegramMessage {
    message_id: i64,
}

pub struct TelegramClient {
    client: Client,
    token: String,
    chat_id: String,
}

impl TelegramClient {
    /// `None` unless both the bot token and chat id are configured.
    pub fn from_config(config: &PublisherConfig) -> Option<Self> {
        match (&config.telegram_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) if !token.is_empty() && !chat_id.is_empty() => Some(Self {
                client: Client::new(),
                token: token.clone(),
                chat_id: chat_id.clone(),
            }),
            _ => None,
        }
    }

    /// Sends `text` once and returns the message id Telegram confirmed.
    async fn send_message(&self, text: &str) -> Result<i64> {
        let url = format!("https://api.telegram.org/bot{}/sendMessage", self.token);
        let response: TelegramResponse = self
            .client
            .post(url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text,
            })
            .send()
            .await
            .context("posting to Telegram")?
            .json()
            .await
            .context("decoding Telegram response")?;

        match response {
            TelegramResponse {
                ok: true,
                result: Some(message),
                ..
            } => Ok(message.message_id),
            TelegramResponse { description, .. } => bail!(
                "Telegram did not confirm the post: {}",
                description.unwrap_or_else(|| "no description".to_string())
            ),
        }
    }

    /// Posts `text`, retrying until Telegram confirms it or the attempts run out.
    pub async fn post(&self, text: &str, config: &PublisherConfig) -> Result<i64> {
        let delay = Duration::from_millis(config.retry_delay_ms);
        let message_id = with_retries(config.attempts, delay, |_| self.send_message(text)).await?;
        log::info!("posted to Telegram chat {} (message {})", self.chat_id, message_id);
        Ok(message_id)
    }
}
