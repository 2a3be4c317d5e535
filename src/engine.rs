//! Entry points producers and collaborators call into.
//!
//! Every evaluation path ends in [`TriggerCoordinator::dispatch`], so a slow
//! notifier never holds up the tick or poll that found the match. The
//! returned handles are only awaited by tests.

use log::{debug, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::alerts::evaluator::{self, PriceHistory};
use crate::alerts::{AlertCache, AlertCondition, AlertId, TriggerCoordinator, TriggerOutcome};
use crate::broadcast::{ViewerHub, ViewerId, ViewerSender};
use crate::error::Result;
use crate::market::{Currency, MarketSnapshot, Reading, SharedSnapshot};

pub type Dispatched = Vec<JoinHandle<TriggerOutcome>>;

pub struct AlertEngine {
    snapshot: Arc<SharedSnapshot>,
    cache: Arc<AlertCache>,
    history: PriceHistory,
    coordinator: Arc<TriggerCoordinator>,
    viewers: Arc<ViewerHub>,
}

impl AlertEngine {
    pub fn new(
        snapshot: Arc<SharedSnapshot>,
        cache: Arc<AlertCache>,
        coordinator: Arc<TriggerCoordinator>,
        viewers: Arc<ViewerHub>,
    ) -> Self {
        Self {
            snapshot,
            cache,
            history: PriceHistory::new(),
            coordinator,
            viewers,
        }
    }

    pub fn snapshot(&self) -> &Arc<SharedSnapshot> {
        &self.snapshot
    }

    /// Build the alert cache once before producers start.
    pub async fn warm_up(&self) -> Result<()> {
        self.cache.refresh(true).await
    }

    fn dispatch_all(&self, hits: Vec<AlertCondition>, value: f64, out: &mut Dispatched) {
        for condition in hits {
            out.push(self.coordinator.dispatch(condition, value));
        }
    }

    fn dispatch_levels(&self, conditions: &[AlertCondition], value: Option<f64>, out: &mut Dispatched) {
        if let Some(value) = value {
            self.dispatch_all(evaluator::level_hits(conditions, value), value, out);
        }
    }

    /// Called by the feed connector that owns `currency`'s price.
    pub async fn on_price_tick(&self, currency: Currency, price: f64) -> Dispatched {
        self.snapshot.set_price(currency, price);
        let previous = self.history.advance(currency, price);

        let mut fired = Vec::new();
        let Some(index) = self.cache.load().await else {
            return fired;
        };

        if let Some(prior) = previous {
            let hits = evaluator::price_crossings(&index, currency, prior, price);
            self.dispatch_all(hits, price, &mut fired);
        }
        self.dispatch_levels(index.premium(), self.snapshot.premium(), &mut fired);
        fired
    }

    /// Called by a poller with its fresh reading.
    pub async fn on_reading(&self, reading: Reading) -> Dispatched {
        self.snapshot.apply(&reading);

        let mut fired = Vec::new();
        let Some(index) = self.cache.load().await else {
            return fired;
        };

        match &reading {
            Reading::Rsi(interval, rsi) => {
                self.dispatch_levels(index.rsi(*interval), Some(rsi.value), &mut fired)
            }
            Reading::Dominance(value) => {
                self.dispatch_levels(index.dominance(), Some(*value), &mut fired)
            }
            Reading::Mvrv(value) => self.dispatch_levels(index.mvrv(), Some(*value), &mut fired),
            Reading::MaCross(periods) => {
                for (period, cross) in periods {
                    let hits = evaluator::breakout_hits(index.moving_average(*period), cross);
                    self.dispatch_all(hits, cross.ma, &mut fired);
                }
            }
            // The premium depends on the rate.
            Reading::FxRate(_) => {
                self.dispatch_levels(index.premium(), self.snapshot.premium(), &mut fired)
            }
            Reading::FearGreed(_) | Reading::RollingHigh(..) | Reading::Volume(_) => {}
        }
        fired
    }

    /// Rebuild the cache now and check `condition` against the current
    /// snapshot instead of waiting for the next update.
    pub async fn on_new_alert_created(&self, condition: &AlertCondition) -> Option<JoinHandle<TriggerOutcome>> {
        self.cache.invalidate();
        if let Err(e) = self.cache.refresh(true).await {
            warn!("Alert cache refresh after creating alert {} failed: {}", condition.id, e);
        }
        if !condition.active {
            return None;
        }
        evaluator::check_current(condition, &self.snapshot)
            .map(|value| self.coordinator.dispatch(condition.clone(), value))
    }

    pub fn on_alert_toggled(&self, id: AlertId) {
        debug!("Alert {} toggled, invalidating cache", id);
        self.cache.invalidate();
    }

    pub fn on_alert_deleted(&self, id: AlertId) {
        debug!("Alert {} deleted, invalidating cache", id);
        self.cache.invalidate();
    }

    pub fn current_snapshot(&self) -> MarketSnapshot {
        self.snapshot.snapshot()
    }

    pub async fn subscribe(&self, sender: ViewerSender) -> ViewerId {
        self.viewers.subscribe(sender, &self.snapshot.snapshot()).await
    }

    pub async fn unsubscribe(&self, id: ViewerId) {
        self.viewers.unsubscribe(id).await
    }
}
