//! The shared market snapshot.
//!
//! Each producer owns one partition and only that partition has a lock, so
//! two producers never contend. Readers assemble a consistent-enough
//! [`MarketSnapshot`] by copying every partition out in turn.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use super::types::{Currency, FearGreed, MaCross, MaPeriod, RsiInterval, RsiReading, VolumeBucket};

/// A value per quote currency. `None` means the producer has not reported yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PerCurrency {
    pub krw: Option<f64>,
    pub usd: Option<f64>,
}

impl PerCurrency {
    pub fn get(&self, currency: Currency) -> Option<f64> {
        match currency {
            Currency::Krw => self.krw,
            Currency::Usd => self.usd,
        }
    }

    pub fn set(&mut self, currency: Currency, value: f64) {
        match currency {
            Currency::Krw => self.krw = Some(value),
            Currency::Usd => self.usd = Some(value),
        }
    }
}

/// Point-in-time copy of every tracked metric, as served to viewers and
/// HTTP handlers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarketSnapshot {
    pub krw: Option<f64>,
    pub usd: Option<f64>,
    pub usd_krw_rate: f64,
    pub kimchi_premium: Option<f64>,
    pub change_24h: PerCurrency,
    pub rsi: BTreeMap<RsiInterval, RsiReading>,
    pub dominance: Option<f64>,
    pub mvrv: Option<f64>,
    pub fear_greed: Option<FearGreed>,
    pub ma_cross: BTreeMap<MaPeriod, MaCross>,
    pub rolling_high: PerCurrency,
    pub volume: BTreeMap<VolumeBucket, f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// One poller's output. Applying it writes exactly the partition that
/// poller owns.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Rsi(RsiInterval, RsiReading),
    Dominance(f64),
    Mvrv(f64),
    FearGreed(FearGreed),
    MaCross(BTreeMap<MaPeriod, MaCross>),
    RollingHigh(Currency, f64),
    Volume(BTreeMap<VolumeBucket, f64>),
    FxRate(f64),
}

/// Cross-venue premium in percent, rounded to two decimals.
pub fn kimchi_premium(krw: f64, usd: f64, usd_krw_rate: f64) -> Option<f64> {
    if krw <= 0.0 || usd <= 0.0 || usd_krw_rate <= 0.0 {
        return None;
    }
    let premium = (krw / (usd * usd_krw_rate) - 1.0) * 100.0;
    Some((premium * 100.0).round() / 100.0)
}

pub struct SharedSnapshot {
    price: RwLock<PerCurrency>,
    change_24h: RwLock<PerCurrency>,
    fx_rate: RwLock<Option<f64>>,
    default_fx_rate: f64,
    rsi: RwLock<BTreeMap<RsiInterval, RsiReading>>,
    dominance: RwLock<Option<f64>>,
    mvrv: RwLock<Option<f64>>,
    fear_greed: RwLock<Option<FearGreed>>,
    ma_cross: RwLock<BTreeMap<MaPeriod, MaCross>>,
    rolling_high: RwLock<PerCurrency>,
    volume: RwLock<BTreeMap<VolumeBucket, f64>>,
    last_update_ms: AtomicI64,
}

impl SharedSnapshot {
    pub fn new(default_fx_rate: f64) -> Self {
        Self {
            price: RwLock::new(PerCurrency::default()),
            change_24h: RwLock::new(PerCurrency::default()),
            fx_rate: RwLock::new(None),
            default_fx_rate,
            rsi: RwLock::new(BTreeMap::new()),
            dominance: RwLock::new(None),
            mvrv: RwLock::new(None),
            fear_greed: RwLock::new(None),
            ma_cross: RwLock::new(BTreeMap::new()),
            rolling_high: RwLock::new(PerCurrency::default()),
            volume: RwLock::new(BTreeMap::new()),
            last_update_ms: AtomicI64::new(0),
        }
    }

    fn touch(&self) {
        self.last_update_ms
            .fetch_max(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    // ── Feed connector partitions ──────────────────────────────────

    pub fn set_price(&self, currency: Currency, price: f64) {
        self.price.write().set(currency, price);
        self.touch();
    }

    pub fn set_change_24h(&self, currency: Currency, change_pct: f64) {
        self.change_24h.write().set(currency, change_pct);
        self.touch();
    }

    // ── Poller partitions ──────────────────────────────────────────

    pub fn apply(&self, reading: &Reading) {
        match reading {
            Reading::Rsi(interval, value) => {
                self.rsi.write().insert(*interval, *value);
            }
            Reading::Dominance(value) => *self.dominance.write() = Some(*value),
            Reading::Mvrv(value) => *self.mvrv.write() = Some(*value),
            Reading::FearGreed(value) => *self.fear_greed.write() = Some(value.clone()),
            // Merged per key: a period or bucket missing from this reading
            // keeps its last good value.
            Reading::MaCross(periods) => self.ma_cross.write().extend(periods.clone()),
            Reading::RollingHigh(currency, value) => {
                self.rolling_high.write().set(*currency, *value)
            }
            Reading::Volume(buckets) => self.volume.write().extend(buckets.clone()),
            Reading::FxRate(rate) => *self.fx_rate.write() = Some(*rate),
        }
        self.touch();
    }

    // ── Readers ────────────────────────────────────────────────────

    pub fn price(&self, currency: Currency) -> Option<f64> {
        self.price.read().get(currency)
    }

    pub fn usd_krw_rate(&self) -> f64 {
        self.fx_rate.read().unwrap_or(self.default_fx_rate)
    }

    pub fn premium(&self) -> Option<f64> {
        let prices = *self.price.read();
        kimchi_premium(prices.krw?, prices.usd?, self.usd_krw_rate())
    }

    pub fn rsi(&self, interval: RsiInterval) -> Option<RsiReading> {
        self.rsi.read().get(&interval).copied()
    }

    pub fn dominance(&self) -> Option<f64> {
        *self.dominance.read()
    }

    pub fn mvrv(&self) -> Option<f64> {
        *self.mvrv.read()
    }

    pub fn ma_cross(&self, period: MaPeriod) -> Option<MaCross> {
        self.ma_cross.read().get(&period).copied()
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        let prices = *self.price.read();
        let usd_krw_rate = self.usd_krw_rate();
        let kimchi_premium = match (prices.krw, prices.usd) {
            (Some(krw), Some(usd)) => kimchi_premium(krw, usd, usd_krw_rate),
            _ => None,
        };
        let last_update_ms = self.last_update_ms.load(Ordering::Relaxed);

        MarketSnapshot {
            krw: prices.krw,
            usd: prices.usd,
            usd_krw_rate,
            kimchi_premium,
            change_24h: *self.change_24h.read(),
            rsi: self.rsi.read().clone(),
            dominance: self.dominance(),
            mvrv: self.mvrv(),
            fear_greed: self.fear_greed.read().clone(),
            ma_cross: self.ma_cross.read().clone(),
            rolling_high: *self.rolling_high.read(),
            volume: self.volume.read().clone(),
            timestamp: (last_update_ms > 0)
                .then(|| DateTime::<Utc>::from_timestamp_millis(last_update_ms))
                .flatten(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_snapshot_is_uninitialized() {
        let shared = SharedSnapshot::new(1450.0);
        let snap = shared.snapshot();

        assert_eq!(snap.krw, None);
        assert_eq!(snap.kimchi_premium, None);
        assert!(snap.rsi.is_empty());
        assert_eq!(snap.timestamp, None);
        assert_eq!(snap.usd_krw_rate, 1450.0);
    }

    #[test]
    fn premium_is_derived_from_both_prices_and_rate() {
        let shared = SharedSnapshot::new(1400.0);
        shared.set_price(Currency::Krw, 147_000_000.0);
        assert_eq!(shared.premium(), None);

        shared.set_price(Currency::Usd, 100_000.0);
        assert_eq!(shared.premium(), Some(5.0));

        shared.apply(&Reading::FxRate(1470.0));
        assert_eq!(shared.premium(), Some(0.0));
        assert!(shared.snapshot().timestamp.is_some());
    }

    #[test]
    fn readings_only_touch_their_own_partition() {
        let shared = SharedSnapshot::new(1450.0);
        shared.apply(&Reading::Rsi(RsiInterval::H1, RsiReading::new(72.0)));
        shared.apply(&Reading::Dominance(54.2));

        assert_eq!(shared.rsi(RsiInterval::H1).map(|r| r.value), Some(72.0));
        assert_eq!(shared.rsi(RsiInterval::H4), None);
        assert_eq!(shared.dominance(), Some(54.2));
        assert_eq!(shared.mvrv(), None);
    }

    #[test]
    fn partial_readings_merge_into_previous_values() {
        let shared = SharedSnapshot::new(1450.0);
        shared.apply(&Reading::Volume(BTreeMap::from([
            (VolumeBucket::H1, 10.0),
            (VolumeBucket::H24, 240.0),
        ])));
        shared.apply(&Reading::Volume(BTreeMap::from([(VolumeBucket::H1, 12.0)])));

        let volume = shared.snapshot().volume;
        assert_eq!(volume[&VolumeBucket::H1], 12.0);
        assert_eq!(volume[&VolumeBucket::H24], 240.0);
    }

    #[test]
    fn snapshot_serializes_interval_keyed_maps() {
        let shared = SharedSnapshot::new(1450.0);
        shared.apply(&Reading::Rsi(RsiInterval::M15, RsiReading::new(25.0)));

        let json = serde_json::to_value(shared.snapshot()).unwrap();
        assert_eq!(json["rsi"]["15m"]["value"], 25.0);
        assert_eq!(json["rsi"]["15m"]["signal"], "bull");
    }
}
