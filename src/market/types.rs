use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{AlertWatchError, Result};

/// Quote currency of a venue. KRW is the primary (Upbit) market, USD the
/// reference (Binance USDT) market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Krw,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Krw, Currency::Usd];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Krw => "KRW",
            Currency::Usd => "USD",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "KRW" => Ok(Currency::Krw),
            "USD" | "USDT" => Ok(Currency::Usd),
            other => Err(AlertWatchError::InvalidAlert(format!(
                "currency must be KRW or USD, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candle granularities an RSI condition can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RsiInterval {
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl RsiInterval {
    pub const ALL: [RsiInterval; 4] = [
        RsiInterval::M15,
        RsiInterval::H1,
        RsiInterval::H4,
        RsiInterval::D1,
    ];

    pub fn as_secs(&self) -> u64 {
        match self {
            RsiInterval::M15 => 900,
            RsiInterval::H1 => 3600,
            RsiInterval::H4 => 14400,
            RsiInterval::D1 => 86400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RsiInterval::M15 => "15m",
            RsiInterval::H1 => "1h",
            RsiInterval::H4 => "4h",
            RsiInterval::D1 => "1d",
        }
    }

    /// Poll cadence: one refresh per candle.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.as_secs())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "15m" => Ok(RsiInterval::M15),
            "1h" => Ok(RsiInterval::H1),
            "4h" => Ok(RsiInterval::H4),
            "1d" => Ok(RsiInterval::D1),
            other => Err(AlertWatchError::InvalidAlert(format!(
                "RSI interval must be one of 15m, 1h, 4h, 1d, got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for RsiInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Daily moving-average periods tracked for breakout detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MaPeriod {
    #[serde(rename = "20")]
    Ma20,
    #[serde(rename = "50")]
    Ma50,
    #[serde(rename = "100")]
    Ma100,
    #[serde(rename = "200")]
    Ma200,
}

impl MaPeriod {
    pub const ALL: [MaPeriod; 4] = [
        MaPeriod::Ma20,
        MaPeriod::Ma50,
        MaPeriod::Ma100,
        MaPeriod::Ma200,
    ];

    pub fn days(&self) -> usize {
        match self {
            MaPeriod::Ma20 => 20,
            MaPeriod::Ma50 => 50,
            MaPeriod::Ma100 => 100,
            MaPeriod::Ma200 => 200,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MaPeriod::Ma20 => "20",
            MaPeriod::Ma50 => "50",
            MaPeriod::Ma100 => "100",
            MaPeriod::Ma200 => "200",
        }
    }

    /// Accepts both `"50"` and `"ma50"`.
    pub fn parse(raw: &str) -> Result<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        match lowered.trim_start_matches("ma") {
            "20" => Ok(MaPeriod::Ma20),
            "50" => Ok(MaPeriod::Ma50),
            "100" => Ok(MaPeriod::Ma100),
            "200" => Ok(MaPeriod::Ma200),
            _ => Err(AlertWatchError::InvalidAlert(format!(
                "moving-average period must be one of 20, 50, 100, 200, got '{}'",
                raw
            ))),
        }
    }
}

impl fmt::Display for MaPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MA{}", self.as_str())
    }
}

/// Rolling windows for traded volume, summed from hourly candles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VolumeBucket {
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "24h")]
    H24,
}

impl VolumeBucket {
    pub const ALL: [VolumeBucket; 3] = [VolumeBucket::H1, VolumeBucket::H4, VolumeBucket::H24];

    pub fn hours(&self) -> usize {
        match self {
            VolumeBucket::H1 => 1,
            VolumeBucket::H4 => 4,
            VolumeBucket::H24 => 24,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RsiSignal {
    /// Oversold (RSI <= 30).
    Bull,
    /// Overbought (RSI >= 70).
    Bear,
    Neutral,
}

impl RsiSignal {
    pub fn classify(rsi: f64) -> Self {
        if rsi >= 70.0 {
            RsiSignal::Bear
        } else if rsi <= 30.0 {
            RsiSignal::Bull
        } else {
            RsiSignal::Neutral
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RsiReading {
    pub value: f64,
    pub signal: RsiSignal,
}

impl RsiReading {
    pub fn new(value: f64) -> Self {
        Self {
            value,
            signal: RsiSignal::classify(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FearGreed {
    pub value: u8,
    pub classification: String,
}

/// Moving-average state for one period plus the 2-session confirmed
/// breakout flags.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MaCross {
    pub ma: f64,
    pub upper: f64,
    pub lower: f64,
    pub breakout_up: bool,
    pub breakout_down: bool,
}

/// OHLCV candle as returned by the venue REST APIs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_enumerated_sub_intervals() {
        assert_eq!(RsiInterval::parse("1H").unwrap(), RsiInterval::H1);
        assert_eq!(MaPeriod::parse("ma200").unwrap(), MaPeriod::Ma200);
        assert_eq!(MaPeriod::parse("50").unwrap(), MaPeriod::Ma50);
        assert_eq!(Currency::parse("usdt").unwrap(), Currency::Usd);

        assert!(RsiInterval::parse("5m").is_err());
        assert!(MaPeriod::parse("ma7").is_err());
        assert!(Currency::parse("EUR").is_err());
    }

    #[test]
    fn rsi_signal_boundaries() {
        assert_eq!(RsiSignal::classify(70.0), RsiSignal::Bear);
        assert_eq!(RsiSignal::classify(30.0), RsiSignal::Bull);
        assert_eq!(RsiSignal::classify(55.5), RsiSignal::Neutral);
    }

    #[test]
    fn enum_keys_serialize_as_interval_labels() {
        let json = serde_json::to_string(&RsiInterval::M15).unwrap();
        assert_eq!(json, "\"15m\"");
        let json = serde_json::to_string(&MaPeriod::Ma100).unwrap();
        assert_eq!(json, "\"100\"");
    }
}
