//! Periodic indicator producers.
//!
//! Each [`PollJob`] owns one snapshot partition. A failed or timed-out
//! poll leaves the previous reading in place.

use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};

use crate::api::MarketSource;
use crate::engine::AlertEngine;
use crate::error::{AlertWatchError, Result};
use crate::indicators;
use crate::market::{Currency, MaPeriod, Reading, RsiInterval, RsiReading};

const HOUR: Duration = Duration::from_secs(3600);
const MINUTE: Duration = Duration::from_secs(60);

/// Candles requested for RSI. Longer history settles the smoothing.
const RSI_HISTORY: usize = 200;

/// Daily candles for the moving averages; one more than the longest period
/// plus the in-progress session.
const MA_HISTORY: usize = 202;

#[async_trait]
pub trait PollJob: Send + Sync {
    fn name(&self) -> String;

    fn cadence(&self) -> Duration;

    async fn poll(&self) -> Result<Reading>;
}

pub struct RsiJob {
    source: Arc<dyn MarketSource>,
    interval: RsiInterval,
}

#[async_trait]
impl PollJob for RsiJob {
    fn name(&self) -> String {
        format!("rsi-{}", self.interval)
    }

    fn cadence(&self) -> Duration {
        self.interval.cadence()
    }

    async fn poll(&self) -> Result<Reading> {
        let candles = self
            .source
            .candles(Currency::Krw, self.interval, RSI_HISTORY)
            .await?;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let value = indicators::rsi(&closes, indicators::RSI_LENGTH)?;
        Ok(Reading::Rsi(self.interval, RsiReading::new(value)))
    }
}

pub struct DominanceJob(Arc<dyn MarketSource>);

#[async_trait]
impl PollJob for DominanceJob {
    fn name(&self) -> String {
        "dominance".to_string()
    }

    fn cadence(&self) -> Duration {
        HOUR
    }

    async fn poll(&self) -> Result<Reading> {
        Ok(Reading::Dominance(self.0.dominance().await?))
    }
}

pub struct MvrvJob(Arc<dyn MarketSource>);

#[async_trait]
impl PollJob for MvrvJob {
    fn name(&self) -> String {
        "mvrv".to_string()
    }

    fn cadence(&self) -> Duration {
        HOUR
    }

    async fn poll(&self) -> Result<Reading> {
        Ok(Reading::Mvrv(self.0.mvrv().await?))
    }
}

pub struct FearGreedJob(Arc<dyn MarketSource>);

#[async_trait]
impl PollJob for FearGreedJob {
    fn name(&self) -> String {
        "fear-greed".to_string()
    }

    fn cadence(&self) -> Duration {
        HOUR
    }

    async fn poll(&self) -> Result<Reading> {
        Ok(Reading::FearGreed(self.0.fear_greed().await?))
    }
}

/// Breakout state for every [`MaPeriod`], from closed daily sessions.
pub struct MaCrossJob(Arc<dyn MarketSource>);

#[async_trait]
impl PollJob for MaCrossJob {
    fn name(&self) -> String {
        "ma-cross".to_string()
    }

    fn cadence(&self) -> Duration {
        HOUR
    }

    async fn poll(&self) -> Result<Reading> {
        let candles = self
            .0
            .candles(Currency::Usd, RsiInterval::D1, MA_HISTORY)
            .await?;
        // The last candle is today's, still open.
        let closed = &candles[..candles.len().saturating_sub(1)];
        let closes: Vec<f64> = closed.iter().map(|c| c.close).collect();
        let crosses = indicators::ma_crosses(&closes, &MaPeriod::ALL);
        if crosses.is_empty() {
            return Err(AlertWatchError::Indicator(format!(
                "{} closed daily candles are too few for any moving average",
                closes.len()
            )));
        }
        Ok(Reading::MaCross(crosses))
    }
}

pub struct RollingHighJob {
    source: Arc<dyn MarketSource>,
    currency: Currency,
    days: usize,
}

#[async_trait]
impl PollJob for RollingHighJob {
    fn name(&self) -> String {
        format!("high-{}d-{}", self.days, self.currency)
    }

    fn cadence(&self) -> Duration {
        HOUR
    }

    async fn poll(&self) -> Result<Reading> {
        let candles = self
            .source
            .candles(self.currency, RsiInterval::D1, self.days)
            .await?;
        Ok(Reading::RollingHigh(self.currency, indicators::rolling_high(&candles)?))
    }
}

pub struct VolumeJob(Arc<dyn MarketSource>);

#[async_trait]
impl PollJob for VolumeJob {
    fn name(&self) -> String {
        "volume".to_string()
    }

    fn cadence(&self) -> Duration {
        MINUTE
    }

    async fn poll(&self) -> Result<Reading> {
        let hourly = self.0.candles(Currency::Usd, RsiInterval::H1, 24).await?;
        let buckets = indicators::volume_buckets(&hourly);
        if buckets.is_empty() {
            return Err(AlertWatchError::Indicator("no hourly candles for volume".to_string()));
        }
        Ok(Reading::Volume(buckets))
    }
}

pub struct FxRateJob(Arc<dyn MarketSource>);

#[async_trait]
impl PollJob for FxRateJob {
    fn name(&self) -> String {
        "usd-krw".to_string()
    }

    fn cadence(&self) -> Duration {
        HOUR
    }

    async fn poll(&self) -> Result<Reading> {
        Ok(Reading::FxRate(self.0.usd_krw_rate().await?))
    }
}

/// One job per tracked metric.
pub fn standard_jobs(source: Arc<dyn MarketSource>, rolling_high_days: usize) -> Vec<Arc<dyn PollJob>> {
    let mut jobs: Vec<Arc<dyn PollJob>> = RsiInterval::ALL
        .iter()
        .map(|&interval| {
            Arc::new(RsiJob {
                source: source.clone(),
                interval,
            }) as Arc<dyn PollJob>
        })
        .collect();

    jobs.push(Arc::new(DominanceJob(source.clone())));
    jobs.push(Arc::new(MvrvJob(source.clone())));
    jobs.push(Arc::new(FearGreedJob(source.clone())));
    jobs.push(Arc::new(MaCrossJob(source.clone())));
    for currency in Currency::ALL {
        jobs.push(Arc::new(RollingHighJob {
            source: source.clone(),
            currency,
            days: rolling_high_days,
        }));
    }
    jobs.push(Arc::new(VolumeJob(source.clone())));
    jobs.push(Arc::new(FxRateJob(source)));
    jobs
}

/// Drives one job on its cadence and hands each reading to the engine.
#[derive(Clone)]
pub struct Poller {
    job: Arc<dyn PollJob>,
    engine: Arc<AlertEngine>,
    poll_timeout: Duration,
}

impl Poller {
    pub fn new(job: Arc<dyn PollJob>, engine: Arc<AlertEngine>, poll_timeout: Duration) -> Self {
        Self {
            job,
            engine,
            poll_timeout,
        }
    }

    pub fn name(&self) -> String {
        self.job.name()
    }

    /// First poll fires immediately, then once per cadence.
    pub async fn run(self) {
        let mut ticker = interval(self.job.cadence());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// Returns whether the snapshot was updated.
    pub async fn poll_once(&self) -> bool {
        let name = self.job.name();
        match timeout(self.poll_timeout, self.job.poll()).await {
            Ok(Ok(reading)) => {
                debug!("{} updated: {:?}", name, reading);
                self.engine.on_reading(reading).await;
                true
            }
            Ok(Err(e)) => {
                warn!("{} poll failed, keeping previous value: {}", name, e);
                false
            }
            Err(_) => {
                warn!(
                    "{} poll timed out after {:?}, keeping previous value",
                    name, self.poll_timeout
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertCache, SqliteAlertStore, TriggerCoordinator};
    use crate::broadcast::ViewerHub;
    use crate::market::{Candle, MaCross, SharedSnapshot, VolumeBucket};
    use std::collections::BTreeMap;
    use crate::notify::LogNotifier;
    use parking_lot::Mutex;

    /// A job whose next result is scripted by the test.
    struct Scripted {
        next: Mutex<Option<Result<Reading>>>,
        delay: Duration,
    }

    #[async_trait]
    impl PollJob for Scripted {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn cadence(&self) -> Duration {
            MINUTE
        }

        async fn poll(&self) -> Result<Reading> {
            tokio::time::sleep(self.delay).await;
            self.next
                .lock()
                .take()
                .unwrap_or_else(|| Err(AlertWatchError::Parse("no script".into())))
        }
    }

    fn engine() -> Arc<AlertEngine> {
        let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
        let cache = Arc::new(AlertCache::new(store.clone(), Duration::from_secs(30), Duration::from_secs(5)));
        let coordinator = Arc::new(TriggerCoordinator::new(
            store,
            cache.clone(),
            Arc::new(LogNotifier),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        Arc::new(AlertEngine::new(
            Arc::new(SharedSnapshot::new(1450.0)),
            cache,
            coordinator,
            Arc::new(ViewerHub::new()),
        ))
    }

    fn scripted(result: Result<Reading>, delay: Duration) -> Arc<Scripted> {
        Arc::new(Scripted {
            next: Mutex::new(Some(result)),
            delay,
        })
    }

    #[tokio::test]
    async fn failure_keeps_previous_value() {
        let engine = engine();
        let job = scripted(Ok(Reading::Dominance(54.1)), Duration::ZERO);
        let poller = Poller::new(job.clone(), engine.clone(), Duration::from_secs(1));

        assert!(poller.poll_once().await);
        *job.next.lock() = Some(Err(AlertWatchError::Upstream {
            service: "CoinMarketCap",
            status: 500,
        }));
        assert!(!poller.poll_once().await);

        assert_eq!(engine.current_snapshot().dominance, Some(54.1));
    }

    #[tokio::test]
    async fn hung_poller_does_not_block_others() {
        let engine = engine();
        let stuck = Poller::new(
            scripted(Ok(Reading::Mvrv(2.0)), Duration::from_secs(3600)),
            engine.clone(),
            Duration::from_millis(50),
        );
        let healthy = Poller::new(
            scripted(Ok(Reading::Dominance(50.0)), Duration::ZERO),
            engine.clone(),
            Duration::from_secs(1),
        );

        let stuck_task = tokio::spawn(async move { stuck.poll_once().await });
        assert!(healthy.poll_once().await);
        engine.on_price_tick(Currency::Krw, 147_000_000.0).await;

        let snapshot = engine.current_snapshot();
        assert_eq!(snapshot.dominance, Some(50.0));
        assert_eq!(snapshot.krw, Some(147_000_000.0));

        assert!(!stuck_task.await.unwrap());
        assert_eq!(engine.current_snapshot().mvrv, None);
    }

    /// Answers every candle request with the same fixed history.
    struct FixedCandles(Vec<Candle>);

    #[async_trait]
    impl MarketSource for FixedCandles {
        async fn change_24h(&self, _: Currency) -> Result<f64> {
            Ok(0.0)
        }
        async fn candles(&self, _: Currency, _: RsiInterval, _: usize) -> Result<Vec<Candle>> {
            Ok(self.0.clone())
        }
        async fn dominance(&self) -> Result<f64> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn mvrv(&self) -> Result<f64> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn fear_greed(&self) -> Result<crate::market::FearGreed> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn usd_krw_rate(&self) -> Result<f64> {
            Err(AlertWatchError::Parse("unused".into()))
        }
    }

    fn flat_candles(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| Candle {
                open: 100.0,
                high: 100.0,
                low: 100.0,
                close: 100.0,
                volume: 2.0,
                timestamp: i as i64,
            })
            .collect()
    }

    fn good_cross() -> MaCross {
        MaCross {
            ma: 100.0,
            upper: 102.0,
            lower: 98.0,
            breakout_up: false,
            breakout_down: false,
        }
    }

    #[tokio::test]
    async fn empty_history_keeps_previous_ma_and_volume() {
        let engine = engine();
        engine
            .on_reading(Reading::MaCross(BTreeMap::from([(MaPeriod::Ma20, good_cross())])))
            .await;
        engine
            .on_reading(Reading::Volume(BTreeMap::from([(VolumeBucket::H1, 3.5)])))
            .await;

        let source: Arc<dyn MarketSource> = Arc::new(FixedCandles(Vec::new()));
        let ma = Poller::new(Arc::new(MaCrossJob(source.clone())), engine.clone(), Duration::from_secs(1));
        let volume = Poller::new(Arc::new(VolumeJob(source)), engine.clone(), Duration::from_secs(1));
        assert!(!ma.poll_once().await);
        assert!(!volume.poll_once().await);

        let snapshot = engine.current_snapshot();
        assert_eq!(snapshot.ma_cross.get(&MaPeriod::Ma20), Some(&good_cross()));
        assert_eq!(snapshot.volume.get(&VolumeBucket::H1), Some(&3.5));
    }

    #[tokio::test]
    async fn short_history_only_updates_periods_it_covers() {
        let engine = engine();
        let mut long = good_cross();
        long.ma = 90_000.0;
        engine
            .on_reading(Reading::MaCross(BTreeMap::from([(MaPeriod::Ma200, long)])))
            .await;

        // 31 candles, the last still open: enough for MA20 only.
        let source: Arc<dyn MarketSource> = Arc::new(FixedCandles(flat_candles(31)));
        let ma = Poller::new(Arc::new(MaCrossJob(source)), engine.clone(), Duration::from_secs(1));
        assert!(ma.poll_once().await);

        let snapshot = engine.current_snapshot();
        assert_eq!(snapshot.ma_cross[&MaPeriod::Ma20].ma, 100.0);
        assert_eq!(snapshot.ma_cross[&MaPeriod::Ma200].ma, 90_000.0);
        assert!(!snapshot.ma_cross.contains_key(&MaPeriod::Ma50));
    }

    #[test]
    fn standard_jobs_cover_every_metric() {
        struct Unused;

        #[async_trait]
        impl MarketSource for Unused {
            async fn change_24h(&self, _: Currency) -> Result<f64> {
                Ok(0.0)
            }
            async fn candles(&self, _: Currency, _: RsiInterval, _: usize) -> Result<Vec<crate::market::Candle>> {
                Ok(Vec::new())
            }
            async fn dominance(&self) -> Result<f64> {
                Ok(0.0)
            }
            async fn mvrv(&self) -> Result<f64> {
                Ok(0.0)
            }
            async fn fear_greed(&self) -> Result<crate::market::FearGreed> {
                Err(AlertWatchError::Parse("unused".into()))
            }
            async fn usd_krw_rate(&self) -> Result<f64> {
                Ok(1450.0)
            }
        }

        let jobs = standard_jobs(Arc::new(Unused), 90);
        let names: Vec<String> = jobs.iter().map(|j| j.name()).collect();
        assert_eq!(jobs.len(), 12);
        assert!(names.contains(&"rsi-15m".to_string()));
        assert!(names.contains(&"high-90d-KRW".to_string()));
        assert!(names.contains(&"usd-krw".to_string()));
    }
}
