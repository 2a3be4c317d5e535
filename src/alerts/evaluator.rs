//! Per-type satisfaction rules.

use parking_lot::Mutex;

use super::cache::AlertIndex;
use super::model::{AlertCondition, AlertKind, Direction};
use crate::market::{Currency, MaCross, PerCurrency, SharedSnapshot};

/// Where a currency's price stood before the current tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorPrice {
    pub last: f64,
    /// Most recent observation that differs from `last`.
    pub distinct: Option<f64>,
}

#[derive(Debug, Default)]
struct Track {
    last: PerCurrency,
    distinct: PerCurrency,
}

/// Price history per currency, used only for crossing detection.
#[derive(Debug, Default)]
pub struct PriceHistory {
    track: Mutex<Track>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `price` and return where the price stood before it, if any.
    pub fn advance(&self, currency: Currency, price: f64) -> Option<PriorPrice> {
        let mut track = self.track.lock();
        let Some(last) = track.last.get(currency) else {
            track.last.set(currency, price);
            return None;
        };
        let prior = PriorPrice {
            last,
            distinct: track.distinct.get(currency),
        };
        if price != last {
            track.distinct.set(currency, last);
            track.last.set(currency, price);
        }
        Some(prior)
    }
}

/// Edge crossing: the threshold lies strictly between `old` and `new` in
/// the condition's direction.
pub fn crossed(direction: Direction, old: f64, new: f64, threshold: f64) -> bool {
    match direction {
        Direction::Above => old < threshold && threshold < new,
        Direction::Below => old > threshold && threshold > new,
    }
}

/// Price conditions crossed by moving from `prior` to `new`. A condition
/// whose threshold equals the previous price is judged from the last price
/// before it, so touching the threshold and then leaving it counts once.
pub fn price_crossings(
    index: &AlertIndex,
    currency: Currency,
    prior: PriorPrice,
    new: f64,
) -> Vec<AlertCondition> {
    let old = prior.last;
    if old == new {
        return Vec::new();
    }
    let (low, high) = if old < new { (old, new) } else { (new, old) };
    index
        .price_in_range(currency, low, high)
        .filter(|c| {
            let origin = if c.threshold == old { prior.distinct } else { Some(old) };
            origin.map_or(false, |origin| crossed(c.direction, origin, new, c.threshold))
        })
        .cloned()
        .collect()
}

pub fn level_hits(conditions: &[AlertCondition], value: f64) -> Vec<AlertCondition> {
    conditions
        .iter()
        .filter(|c| c.direction.holds(value, c.threshold))
        .cloned()
        .collect()
}

pub fn breakout_hits(conditions: &[AlertCondition], cross: &MaCross) -> Vec<AlertCondition> {
    conditions
        .iter()
        .filter(|c| breakout_matches(c.direction, cross))
        .cloned()
        .collect()
}

fn breakout_matches(direction: Direction, cross: &MaCross) -> bool {
    match direction {
        Direction::Above => cross.breakout_up,
        Direction::Below => cross.breakout_down,
    }
}

/// Evaluate a single condition against the current snapshot, returning
/// the observed value when satisfied. Price conditions need a crossing and
/// never match here.
pub fn check_current(condition: &AlertCondition, snapshot: &SharedSnapshot) -> Option<f64> {
    let level = |value: Option<f64>| {
        value.filter(|v| condition.direction.holds(*v, condition.threshold))
    };
    match condition.kind {
        AlertKind::Price { .. } => None,
        AlertKind::Rsi { interval } => level(snapshot.rsi(interval).map(|r| r.value)),
        AlertKind::Premium => level(snapshot.premium()),
        AlertKind::Dominance => level(snapshot.dominance()),
        AlertKind::Mvrv => level(snapshot.mvrv()),
        AlertKind::MovingAverage { period } => snapshot
            .ma_cross(period)
            .filter(|cross| breakout_matches(condition.direction, cross))
            .map(|cross| cross.ma),
    }
}
