use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

use crate::candle_patterns::PATTERN_LOOKBACK;
use crate::pivots::{BEFORE_COUNT, DEFAULT_SENSITIVITY};
use crate::timeframe::Timeframe;

// CONFIGURATION STRUCTS
// storage/config.json is deserialized straight into these. Every section has
// defaults so a partial file still loads.

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct KlineConfig {
    pub limit: u32,         // candles requested from the exchange
    pub candle_count: usize, // candles kept for analysis
    pub max_ban_retries: u32,
}

impl Default for KlineConfig {
    fn default() -> Self {
        Self {
            limit: 270,
            candle_count: 254,
            max_ban_retries: 2,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub sensitivity: usize, // 1 for scalping/daily, 2 default, 3 for fewer levels
    pub before_count: usize,
    pub sma_lengths: [usize; 3],
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub extended_fibonacci: bool, // adds the 1.13 extension
    pub pattern_lookback: usize,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("analysis.sensitivity must be 1, 2 or 3, got {0}")]
    Sensitivity(usize),
    #[error("analysis.before_count must be at least 1")]
    BeforeCount,
}

impl AnalysisConfig {
    /// Rejects values a hand-edited config.json can carry but the pivot scan cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=3).contains(&self.sensitivity) {
            return Err(ConfigError::Sensitivity(self.sensitivity));
        }
        if self.before_count == 0 {
            return Err(ConfigError::BeforeCount);
        }
        Ok(())
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            before_count: BEFORE_COUNT,
            sma_lengths: [20, 50, 100],
            rsi_period: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            extended_fibonacci: false,
            pattern_lookback: PATTERN_LOOKBACK,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PublisherConfig {
    pub output_dir: PathBuf,
    pub telegram_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            telegram_token: None,
            telegram_chat_id: None,
            attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub klines: KlineConfig,
    pub analysis: AnalysisConfig,
    pub publisher: PublisherConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ticker: "BTCUSDT".to_string(),
            timeframe: Timeframe::D1,
            klines: KlineConfig::default(),
            analysis: AnalysisConfig::default(),
            publisher: PublisherConfig::default(),
        }
    }
}

// STORAGE MANAGER

pub struct AsyncStorageManager {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl AsyncStorageManager {
    /// Creates a manager rooted next to the running executable.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::new(base_dir).await
    }

    /// Creates a manager rooted at `base_dir`, creating the directory up front so
    /// later saves never have to check for it.
    pub async fn new<P: Into<PathBuf>>(base_dir: P) -> anyhow::Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir)
                .await
                .with_context(|| format!("creating storage dir {:?}", base_dir))?;
        }
        Ok(Self { base_dir })
    }

    pub fn path_for(&self, filename: &str) -> PathBuf {
        self.base_dir.join(format!("{}.json", filename))
    }

    /// Serializes `data` as pretty JSON and writes it atomically: the bytes go to a
    /// `.tmp` file that is then renamed over the target.
    pub async fn save<T: Serialize>(&self, filename: &str, data: &T) -> anyhow::Result<()> {
        let final_path = self.path_for(filename);
        let tmp_path = self.base_dir.join(format!("{}.json.tmp", filename));

        let json_bytes = serde_json::to_vec_pretty(data)?;
        fs::write(&tmp_path, json_bytes).await?;
        fs::rename(tmp_path, &final_path)
            .await
            .with_context(|| format!("writing {:?}", final_path))?;
        Ok(())
    }

    pub async fn load<T: DeserializeOwned>(&self, filename: &str) -> anyhow::Result<T> {
        let path = self.path_for(filename);
        // serde_json validates UTF-8 itself, so skip read_to_string.
        let content = fs::read(&path)
            .await
            .with_context(|| format!("reading {:?}", path))?;
        let data = serde_json::from_slice(&content)
            .with_context(|| format!("parsing {:?}", path))?;
        Ok(data)
    }

    /// Loads `filename`, or writes `T::default()` there and returns it if the file is missing.
    pub async fn load_or_init<T>(&self, filename: &str) -> anyhow::Result<T>
    where
        T: DeserializeOwned + Serialize + Default,
    {
        if self.path_for(filename).exists() {
            return self.load(filename).await;
        }
        log::info!("no {}.json in {:?}, writing defaults", filename, self.base_dir);
        let data = T::default();
        self.save(filename, &data).await?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("sup-res-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_save_then_load_config() {
        let dir = scratch_dir("save-load");
        let storage = AsyncStorageManager::new(&dir).await.unwrap();

        let mut config = AppConfig::default();
        config.ticker = "ETHUSDT".to_string();
        config.analysis.sensitivity = 3;
        storage.save("config", &config).await.unwrap();

        let loaded: AppConfig = storage.load("config").await.unwrap();
        assert_eq!(loaded.ticker, "ETHUSDT");
        assert_eq!(loaded.analysis.sensitivity, 3);
        assert!(!dir.join("config.json.tmp").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_load_or_init_writes_defaults() {
        let dir = scratch_dir("init");
        let _ = std::fs::remove_dir_all(&dir);
        let storage = AsyncStorageManager::new(&dir).await.unwrap();

        let config: AppConfig = storage.load_or_init("config").await.unwrap();
        assert_eq!(config.klines.candle_count, 254);
        assert!(storage.path_for("config").exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_validate_analysis_ranges() {
        assert_eq!(AnalysisConfig::default().validate(), Ok(()));

        let mut config = AnalysisConfig::default();
        config.sensitivity = usize::MAX;
        assert_eq!(config.validate(), Err(ConfigError::Sensitivity(usize::MAX)));

        config.sensitivity = 0;
        assert_eq!(config.validate(), Err(ConfigError::Sensitivity(0)));

        config.sensitivity = 3;
        config.before_count = 0;
        assert_eq!(config.validate(), Err(ConfigError::BeforeCount));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"timeframe":"4h","analysis":{"sensitivity":1}}"#).unwrap();
        assert_eq!(config.timeframe, Timeframe::H4);
        assert_eq!(config.analysis.sensitivity, 1);
        assert_eq!(config.analysis.before_count, 3);
        assert_eq!(config.analysis.sma_lengths, [20, 50, 100]);
        assert_eq!(config.publisher.attempts, 5);
    }
}
