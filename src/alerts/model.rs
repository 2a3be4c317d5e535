use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AlertWatchError, Result};
use crate::market::{Currency, MaPeriod, RsiInterval};

pub type AlertId = i64;
pub type OwnerId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Above,
    Below,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "above" => Ok(Direction::Above),
            "below" => Ok(Direction::Below),
            other => Err(AlertWatchError::InvalidAlert(format!(
                "direction must be above or below, got '{}'",
                other
            ))),
        }
    }

    /// Level test: strictly past the threshold.
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Direction::Above => value > threshold,
            Direction::Below => value < threshold,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an alert watches. Each variant carries only the fields meaningful
/// for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlertKind {
    Price { currency: Currency },
    Rsi { interval: RsiInterval },
    #[serde(rename = "kimchi_premium")]
    Premium,
    Dominance,
    Mvrv,
    #[serde(rename = "ma_cross")]
    MovingAverage { period: MaPeriod },
}

impl AlertKind {
    /// Rebuild a kind from its stored columns.
    pub fn from_parts(kind: &str, interval: Option<&str>, currency: Option<&str>) -> Result<Self> {
        match kind {
            "price" => Ok(AlertKind::Price {
                currency: Currency::parse(required(kind, currency, "a currency")?)?,
            }),
            "rsi" => Ok(AlertKind::Rsi {
                interval: RsiInterval::parse(required(kind, interval, "an interval")?)?,
            }),
            "kimchi_premium" => Ok(AlertKind::Premium),
            "dominance" => Ok(AlertKind::Dominance),
            "mvrv" => Ok(AlertKind::Mvrv),
            "ma_cross" => Ok(AlertKind::MovingAverage {
                period: MaPeriod::parse(required(kind, interval, "a moving-average period")?)?,
            }),
            other => Err(AlertWatchError::InvalidAlert(format!(
                "unknown alert type '{}'",
                other
            ))),
        }
    }

    /// `(type, interval, currency)` column values.
    pub fn to_parts(&self) -> (&'static str, Option<&'static str>, Option<&'static str>) {
        match self {
            AlertKind::Price { currency } => ("price", None, Some(currency.as_str())),
            AlertKind::Rsi { interval } => ("rsi", Some(interval.as_str()), None),
            AlertKind::Premium => ("kimchi_premium", None, None),
            AlertKind::Dominance => ("dominance", None, None),
            AlertKind::Mvrv => ("mvrv", None, None),
            AlertKind::MovingAverage { period } => ("ma_cross", Some(period.as_str()), None),
        }
    }
}

fn required<'a>(kind: &str, value: Option<&'a str>, what: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| AlertWatchError::InvalidAlert(format!("{} alert requires {}", kind, what)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertCondition {
    pub id: AlertId,
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub kind: AlertKind,
    pub symbol: String,
    pub threshold: f64,
    pub direction: Direction,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub triggered_at: Option<DateTime<Utc>>,
}

/// An alert as submitted, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAlert {
    pub owner_id: OwnerId,
    pub kind: AlertKind,
    pub symbol: String,
    pub threshold: f64,
    pub direction: Direction,
}

impl NewAlert {
    pub fn new(owner_id: OwnerId, kind: AlertKind, threshold: f64, direction: Direction) -> Self {
        Self {
            owner_id,
            kind,
            symbol: "BTC".to_string(),
            threshold,
            direction,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() {
            return Err(AlertWatchError::InvalidAlert(
                "threshold must be a finite number".to_string(),
            ));
        }
        if self.symbol.trim().is_empty() {
            return Err(AlertWatchError::InvalidAlert("symbol is required".to_string()));
        }
        match self.kind {
            AlertKind::Price { .. } | AlertKind::MovingAverage { .. } if self.threshold < 0.0 => {
                Err(AlertWatchError::InvalidAlert(format!(
                    "threshold {} must not be negative",
                    self.threshold
                )))
            }
            AlertKind::Rsi { .. } if !(0.0..=100.0).contains(&self.threshold) => {
                Err(AlertWatchError::InvalidAlert(format!(
                    "RSI threshold {} must be within 0..=100",
                    self.threshold
                )))
            }
            _ => Ok(()),
        }
    }
}
