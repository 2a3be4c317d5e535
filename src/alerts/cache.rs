//! Type-partitioned index over active alerts.
//!
//! Readers load an `Arc<AlertIndex>` without locking. A rebuild constructs a
//! fresh index off to the side and swaps it in whole.

use arc_swap::ArcSwapOption;
use log::{debug, warn};
use parking_lot::Mutex;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

use super::model::{AlertCondition, AlertKind};
use super::store::AlertStore;
use crate::error::{AlertWatchError, Result};
use crate::market::{Currency, MaPeriod, RsiInterval};

/// Total-ordered threshold key.
#[derive(Debug, Clone, Copy)]
struct Threshold(f64);

impl PartialEq for Threshold {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for Threshold {}

impl PartialOrd for Threshold {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Threshold {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.0.total_cmp(&other.0)
    }
}

#[derive(Debug, Default)]
pub struct AlertIndex {
    price: BTreeMap<Threshold, Vec<AlertCondition>>,
    rsi: HashMap<RsiInterval, Vec<AlertCondition>>,
    moving_average: HashMap<MaPeriod, Vec<AlertCondition>>,
    premium: Vec<AlertCondition>,
    dominance: Vec<AlertCondition>,
    mvrv: Vec<AlertCondition>,
    len: usize,
}

impl AlertIndex {
    /// Inactive conditions are dropped.
    pub fn build(conditions: impl IntoIterator<Item = AlertCondition>) -> Self {
        let mut index = AlertIndex::default();
        for condition in conditions.into_iter().filter(|c| c.active) {
            index.len += 1;
            match condition.kind {
                AlertKind::Price { .. } => index
                    .price
                    .entry(Threshold(condition.threshold))
                    .or_default()
                    .push(condition),
                AlertKind::Rsi { interval } => index.rsi.entry(interval).or_default().push(condition),
                AlertKind::MovingAverage { period } => index
                    .moving_average
                    .entry(period)
                    .or_default()
                    .push(condition),
                AlertKind::Premium => index.premium.push(condition),
                AlertKind::Dominance => index.dominance.push(condition),
                AlertKind::Mvrv => index.mvrv.push(condition),
            }
        }
        index
    }

    /// Price conditions for `currency` whose threshold lies in `[low, high]`.
    pub fn price_in_range(
        &self,
        currency: Currency,
        low: f64,
        high: f64,
    ) -> impl Iterator<Item = &AlertCondition> + '_ {
        let range = if low <= high {
            Some(self.price.range(Threshold(low)..=Threshold(high)))
        } else {
            None
        };
        range
            .into_iter()
            .flatten()
            .flat_map(|(_, conditions)| conditions.iter())
            .filter(move |c| matches!(c.kind, AlertKind::Price { currency: cur } if cur == currency))
    }

    pub fn rsi(&self, interval: RsiInterval) -> &[AlertCondition] {
        self.rsi.get(&interval).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn moving_average(&self, period: MaPeriod) -> &[AlertCondition] {
        self.moving_average
            .get(&period)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn premium(&self) -> &[AlertCondition] {
        &self.premium
    }

    pub fn dominance(&self) -> &[AlertCondition] {
        &self.dominance
    }

    pub fn mvrv(&self) -> &[AlertCondition] {
        &self.mvrv
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

pub struct AlertCache {
    store: Arc<dyn AlertStore>,
    ttl: Duration,
    store_timeout: Duration,
    index: ArcSwapOption<AlertIndex>,
    built_at: Mutex<Option<Instant>>,
    dirty: AtomicBool,
    build_lock: tokio::sync::Mutex<()>,
}

impl AlertCache {
    pub fn new(store: Arc<dyn AlertStore>, ttl: Duration, store_timeout: Duration) -> Self {
        Self {
            store,
            ttl,
            store_timeout,
            index: ArcSwapOption::empty(),
            built_at: Mutex::new(None),
            dirty: AtomicBool::new(false),
            build_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Force the next `refresh` to rebuild regardless of TTL.
    pub fn invalidate(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// `None` until the first successful build.
    pub fn current(&self) -> Option<Arc<AlertIndex>> {
        self.index.load_full()
    }

    fn is_stale(&self) -> bool {
        if self.dirty.load(Ordering::SeqCst) {
            return true;
        }
        match *self.built_at.lock() {
            None => true,
            Some(at) => at.elapsed() >= self.ttl,
        }
    }

    /// Rebuild if never built, forced, invalidated, or older than the TTL.
    pub async fn refresh(&self, force: bool) -> Result<()> {
        if !force && !self.is_stale() {
            return Ok(());
        }

        let _guard = self.build_lock.lock().await;
        if !force && !self.is_stale() {
            // Someone else rebuilt while we waited.
            return Ok(());
        }

        // Cleared before the fetch so an invalidation that lands mid-build
        // still forces the next one.
        self.dirty.store(false, Ordering::SeqCst);
        let fetched = match timeout(self.store_timeout, self.store.list_active()).await {
            Ok(result) => result,
            Err(_) => Err(AlertWatchError::Timeout("alert cache rebuild")),
        };
        let conditions = match fetched {
            Ok(conditions) => conditions,
            Err(e) => {
                self.dirty.store(true, Ordering::SeqCst);
                return Err(e);
            }
        };

        let index = AlertIndex::build(conditions);
        debug!("Alert cache rebuilt with {} active conditions", index.len());
        self.index.store(Some(Arc::new(index)));
        *self.built_at.lock() = Some(Instant::now());
        Ok(())
    }

    /// Refresh if needed and return whatever index is available. A failed
    /// rebuild keeps serving the previous index.
    pub async fn load(&self) -> Option<Arc<AlertIndex>> {
        if let Err(e) = self.refresh(false).await {
            warn!("Alert cache refresh failed: {}", e);
        }
        self.current()
    }
}
