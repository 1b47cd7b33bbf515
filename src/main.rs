mod analysis;
mod candle;
mod candle_patterns;
mod cli;
mod fibonacci;
mod indicators;
mod klines;
mod legend;
mod levels;
mod pinescript;
mod pivots;
mod publisher;
mod storage_utils;
mod symbol_info;
mod timeframe;
mod tui;

use anyhow::Context;
use clap::Parser;
use std::time::Instant;

use cli::{CliArgs, Mode};
use storage_utils::{AppConfig, AsyncStorageManager};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let started = Instant::now();

    let args = CliArgs::parse();

    // Step 1: Load configuration
    let storage = AsyncStorageManager::new_relative("storage").await?;
    let mut config: AppConfig = storage.load_or_init("config").await?;
    args.apply(&mut config);
    config
        .analysis
        .validate()
        .context("storage/config.json has an invalid analysis section")?;
    log::info!(
        "{} {} data analysis in progress (sensitivity {})",
        config.ticker,
        config.timeframe,
        config.analysis.sensitivity
    );

    // Step 2: Download candles and analyze them
    let report = analysis::run_analysis_pipeline(&config, &storage.base_dir).await?;

    // Step 3: Render or publish
    match args.mode {
        Mode::Chart => {
            legend::run(&report)?;
            tui::run_tui(report, config, storage.base_dir.clone()).await?;
        }
        Mode::Legend => legend::run(&report)?,
        Mode::Bot => {
            let output_dir = config.publisher.output_dir.clone();
            tokio::fs::create_dir_all(&output_dir)
                .await
                .with_context(|| format!("creating output dir {:?}", output_dir))?;

            publisher::write_outputs(&report, &storage, &output_dir).await?;
            pinescript::write(&report, &output_dir)?;

            match publisher::TelegramClient::from_config(&config.publisher) {
                Some(telegram) => {
                    if let Err(e) = telegram.post(&publisher::caption(&report), &config.publisher).await {
                        log::error!("Error posting to Telegram: {:#}", e);
                    }
                }
                None => log::info!("no Telegram token configured, skipping post"),
            }
        }
    }

    log::info!("completed execution in {:.2?}", started.elapsed());
    Ok(())
}
