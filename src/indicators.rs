//! Indicator math over closed candles, backed by the `ta` crate.

use std::collections::BTreeMap;
use ta::indicators::{Maximum, RelativeStrengthIndex, SimpleMovingAverage};
use ta::Next;

use crate::error::{AlertWatchError, Result};
use crate::market::{Candle, MaCross, MaPeriod, VolumeBucket};

pub const RSI_LENGTH: usize = 14;

/// Half-width of the band around a moving average that a close must clear
/// to count toward a breakout.
pub const BREAKOUT_BAND: f64 = 0.02;

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn ta_error(e: ta::errors::TaError) -> AlertWatchError {
    AlertWatchError::Indicator(format!("{:?}", e))
}

pub fn rsi(closes: &[f64], length: usize) -> Result<f64> {
    if closes.len() <= length {
        return Err(AlertWatchError::Indicator(format!(
            "RSI({}) needs more than {} closes, got {}",
            length,
            length,
            closes.len()
        )));
    }

    let mut rsi = RelativeStrengthIndex::new(length).map_err(ta_error)?;
    let value = closes.iter().fold(0.0, |_, &close| rsi.next(close));
    if !value.is_finite() {
        return Err(AlertWatchError::Indicator("RSI is not finite".to_string()));
    }
    Ok(round2(value))
}

/// MA state for one period. A breakout is confirmed only when the last two
/// closes both sit beyond the band around the average at their own session.
pub fn ma_cross(closes: &[f64], period: MaPeriod) -> Result<MaCross> {
    let n = period.days();
    if closes.len() < n + 1 {
        return Err(AlertWatchError::Indicator(format!(
            "{} needs {} closes, got {}",
            period,
            n + 1,
            closes.len()
        )));
    }

    let mut sma = SimpleMovingAverage::new(n).map_err(ta_error)?;
    let averages: Vec<f64> = closes.iter().map(|&close| sma.next(close)).collect();

    let last = closes.len() - 1;
    let above = |i: usize| closes[i] > averages[i] * (1.0 + BREAKOUT_BAND);
    let below = |i: usize| closes[i] < averages[i] * (1.0 - BREAKOUT_BAND);

    let ma = averages[last];
    Ok(MaCross {
        ma: round2(ma),
        upper: round2(ma * (1.0 + BREAKOUT_BAND)),
        lower: round2(ma * (1.0 - BREAKOUT_BAND)),
        breakout_up: above(last) && above(last - 1),
        breakout_down: below(last) && below(last - 1),
    })
}

/// Every period that has enough history. Periods never depend on each other.
pub fn ma_crosses(closes: &[f64], periods: &[MaPeriod]) -> BTreeMap<MaPeriod, MaCross> {
    periods
        .iter()
        .filter_map(|&period| match ma_cross(closes, period) {
            Ok(cross) => Some((period, cross)),
            Err(e) => {
                log::debug!("Skipping {}: {}", period, e);
                None
            }
        })
        .collect()
}

pub fn rolling_high(candles: &[Candle]) -> Result<f64> {
    if candles.is_empty() {
        return Err(AlertWatchError::Indicator("no candles for rolling high".to_string()));
    }
    let mut max = Maximum::new(candles.len()).map_err(ta_error)?;
    Ok(candles.iter().fold(0.0, |_, c| max.next(c.high)))
}

/// Volume summed over the trailing hours of each bucket. `hourly` must be
/// oldest-first.
pub fn volume_buckets(hourly: &[Candle]) -> BTreeMap<VolumeBucket, f64> {
    VolumeBucket::ALL
        .iter()
        .filter(|bucket| hourly.len() >= bucket.hours())
        .map(|&bucket| {
            let total: f64 = hourly[hourly.len() - bucket.hours()..]
                .iter()
                .map(|c| c.volume)
                .sum();
            (bucket, round2(total))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, volume: f64) -> Candle {
        Candle {
            open: high,
            high,
            low: high,
            close: high,
            volume,
            timestamp: 0,
        }
    }

    #[test]
    fn rsi_tracks_direction() {
        let rising: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();

        assert!(rsi(&rising, RSI_LENGTH).unwrap() > 70.0);
        assert!(rsi(&falling, RSI_LENGTH).unwrap() < 30.0);
        assert!(rsi(&rising[..10], RSI_LENGTH).is_err());
    }

    #[test]
    fn breakout_needs_two_sessions_beyond_band() {
        // 20 flat sessions at 100, then a single spike.
        let mut closes = vec![100.0; 21];
        closes.push(110.0);
        let single = ma_cross(&closes, MaPeriod::Ma20).unwrap();
        assert!(!single.breakout_up);

        // A second close beyond the band confirms it.
        closes.push(112.0);
        let confirmed = ma_cross(&closes, MaPeriod::Ma20).unwrap();
        assert!(confirmed.breakout_up);
        assert!(!confirmed.breakout_down);
        assert!(confirmed.upper > confirmed.ma && confirmed.lower < confirmed.ma);
    }

    #[test]
    fn breakdown_is_detected_independently_per_period() {
        let mut closes = vec![100.0; 60];
        closes.push(90.0);
        closes.push(89.0);

        let crosses = ma_crosses(&closes, &MaPeriod::ALL);
        assert!(crosses[&MaPeriod::Ma20].breakout_down);
        assert!(crosses[&MaPeriod::Ma50].breakout_down);
        // Not enough history for the longer periods.
        assert!(!crosses.contains_key(&MaPeriod::Ma100));
        assert!(!crosses.contains_key(&MaPeriod::Ma200));
    }

    #[test]
    fn rolling_high_and_volume() {
        let candles: Vec<Candle> = (1..=24).map(|i| candle(i as f64, 1.5)).collect();

        assert_eq!(rolling_high(&candles).unwrap(), 24.0);

        let buckets = volume_buckets(&candles);
        assert_eq!(buckets[&VolumeBucket::H1], 1.5);
        assert_eq!(buckets[&VolumeBucket::H4], 6.0);
        assert_eq!(buckets[&VolumeBucket::H24], 36.0);

        assert!(volume_buckets(&candles[..3]).get(&VolumeBucket::H4).is_none());
    }
}
