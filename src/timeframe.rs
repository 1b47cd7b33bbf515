use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum TimeframeError {
    #[error("unsupported timeframe '{0}' (expected one of 1m 3m 5m 15m 30m 1h 2h 4h 6h 8h 12h 1d 3d 1w)")]
    Unsupported(String),
}

/// Binance kline interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    M1,
    M3,
    M5,
    M15,
    M30,
    H1,
    H2,
    H4,
    H6,
    H8,
    H12,
    D1,
    D3,
    W1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M3 => "3m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
            Timeframe::H8 => "8h",
            Timeframe::H12 => "12h",
            Timeframe::D1 => "1d",
            Timeframe::D3 => "3d",
            Timeframe::W1 => "1w",
        }
    }

    /// Daily and above. Candlestick patterns are only scanned on these.
    pub fn is_high(&self) -> bool {
        matches!(self, Timeframe::D1 | Timeframe::D3 | Timeframe::W1)
    }

    /// `chrono` format used for x-axis labels.
    pub fn label_format(&self) -> &'static str {
        if self.is_high() { "%b-%d-%y" } else { "%H:%M %d-%b" }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        let tf = match normalized.as_str() {
            "1m" => Timeframe::M1,
            "3m" => Timeframe::M3,
            "5m" => Timeframe::M5,
            "15m" => Timeframe::M15,
            "30m" => Timeframe::M30,
            "1h" => Timeframe::H1,
            "2h" => Timeframe::H2,
            "4h" => Timeframe::H4,
            "6h" => Timeframe::H6,
            "8h" => Timeframe::H8,
            "12h" => Timeframe::H12,
            "1d" => Timeframe::D1,
            "3d" => Timeframe::D3,
            "1w" => Timeframe::W1,
            _ => return Err(TimeframeError::Unsupported(s.to_string())),
        };
        Ok(tf)
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.as_str().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        assert_eq!("4h".parse::<Timeframe>(), Ok(Timeframe::H4));
        assert_eq!(" 1D ".parse::<Timeframe>(), Ok(Timeframe::D1));
        assert_eq!(Timeframe::M15.to_string(), "15m");
        assert_eq!(
            "2d".parse::<Timeframe>(),
            Err(TimeframeError::Unsupported("2d".to_string()))
        );
    }

    #[test]
    fn test_high_timeframes() {
        assert!(Timeframe::D1.is_high());
        assert!(Timeframe::W1.is_high());
        assert!(!Timeframe::H12.is_high());
        assert_eq!(Timeframe::D3.label_format(), "%b-%d-%y");
        assert_eq!(Timeframe::M5.label_format(), "%H:%M %d-%b");
    }

    #[test]
    fn test_serde_as_string() {
        let json = serde_json::to_string(&Timeframe::H1).unwrap();
        assert_eq!(json, "\"1h\"");
        let tf: Timeframe = serde_json::from_str("\"3d\"").unwrap();
        assert_eq!(tf, Timeframe::D3);
    }
}
