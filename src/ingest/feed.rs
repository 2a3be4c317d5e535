use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use super::supervisor::AbortOnDrop;
use crate::api::MarketSource;
use crate::engine::AlertEngine;
use crate::error::Result;
use crate::market::Currency;

/// A venue's trade stream: where to connect and how to read it.
pub trait Venue: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// The snapshot price this venue owns.
    fn currency(&self) -> Currency;

    fn url(&self) -> &str;

    /// Frame to send right after connecting, if the venue needs one.
    fn subscription(&self) -> Option<String>;

    /// Trade price from one frame, or `None` for frames that aren't trades.
    fn parse_trade(&self, payload: &str) -> Result<Option<f64>>;
}

/// Keeps one venue stream alive and feeds every tick to the engine.
#[derive(Clone)]
pub struct FeedConnector {
    venue: Arc<dyn Venue>,
    engine: Arc<AlertEngine>,
    source: Arc<dyn MarketSource>,
    reconnect_delay: Duration,
    change_refresh: Duration,
}

impl FeedConnector {
    pub fn new(
        venue: Arc<dyn Venue>,
        engine: Arc<AlertEngine>,
        source: Arc<dyn MarketSource>,
        reconnect_delay: Duration,
        change_refresh: Duration,
    ) -> Self {
        Self {
            venue,
            engine,
            source,
            reconnect_delay,
            change_refresh,
        }
    }

    /// Never returns: every failure is followed by a fixed delay and a
    /// fresh connection.
    pub async fn run(self) {
        loop {
            match self.session().await {
                Ok(()) => warn!(
                    "{} stream closed, reconnecting in {:?}",
                    self.venue.name(),
                    self.reconnect_delay
                ),
                Err(e) => error!(
                    "{} stream failed: {}, reconnecting in {:?}",
                    self.venue.name(),
                    e,
                    self.reconnect_delay
                ),
            }
            sleep(self.reconnect_delay).await;
        }
    }

    async fn session(&self) -> Result<()> {
        let name = self.venue.name();
        info!("Connecting to {} WebSocket: {}", name, self.venue.url());

        let (mut ws_stream, _) = connect_async(self.venue.url()).await?;
        info!("Connected to {}", name);

        if let Some(subscription) = self.venue.subscription() {
            ws_stream.send(Message::Text(subscription)).await?;
            debug!("Sent {} subscription", name);
        }

        // Lives as long as this session.
        let _change = AbortOnDrop(self.spawn_change_refresh().abort_handle());

        while let Some(message) = ws_stream.next().await {
            match message {
                Ok(Message::Text(text)) => self.handle_payload(&text).await,
                Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.handle_payload(text).await,
                    Err(e) => warn!("Non-UTF-8 frame from {}: {}", name, e),
                },
                Ok(Message::Close(frame)) => {
                    info!("{} WebSocket closed: {:?}", name, frame);
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn handle_payload(&self, payload: &str) {
        match self.venue.parse_trade(payload) {
            Ok(Some(price)) if price > 0.0 => {
                self.engine.on_price_tick(self.venue.currency(), price).await;
            }
            Ok(Some(price)) => warn!("Ignoring non-positive {} price {}", self.venue.name(), price),
            Ok(None) => {}
            Err(e) => warn!("Failed to parse {} trade: {}", self.venue.name(), e),
        }
    }

    /// Fetch the 24h change now, then every `change_refresh`, for as long
    /// as the session lives.
    fn spawn_change_refresh(&self) -> JoinHandle<()> {
        let source = self.source.clone();
        let snapshot = self.engine.snapshot().clone();
        let currency = self.venue.currency();
        let name = self.venue.name();
        let every = self.change_refresh;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                match source.change_24h(currency).await {
                    Ok(change) => {
                        debug!("{} 24h change: {}%", name, change);
                        snapshot.set_change_24h(currency, change);
                    }
                    Err(e) => warn!("Failed to fetch {} 24h change: {}", name, e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertCache, SqliteAlertStore, TriggerCoordinator};
    use crate::api::binance::BinanceTrades;
    use crate::broadcast::ViewerHub;
    use crate::error::AlertWatchError;
    use crate::market::{Candle, FearGreed, RsiInterval, SharedSnapshot};
    use crate::notify::LogNotifier;
    use async_trait::async_trait;

    struct FixedChange(f64);

    #[async_trait]
    impl MarketSource for FixedChange {
        async fn change_24h(&self, _currency: Currency) -> Result<f64> {
            Ok(self.0)
        }
        async fn candles(&self, _: Currency, _: RsiInterval, _: usize) -> Result<Vec<Candle>> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn dominance(&self) -> Result<f64> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn mvrv(&self) -> Result<f64> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn fear_greed(&self) -> Result<FearGreed> {
            Err(AlertWatchError::Parse("unused".into()))
        }
        async fn usd_krw_rate(&self) -> Result<f64> {
            Err(AlertWatchError::Parse("unused".into()))
        }
    }

    fn connector() -> FeedConnector {
        let store = Arc::new(SqliteAlertStore::in_memory().unwrap());
        let cache = Arc::new(AlertCache::new(store.clone(), Duration::from_secs(30), Duration::from_secs(5)));
        let coordinator = Arc::new(TriggerCoordinator::new(
            store,
            cache.clone(),
            Arc::new(LogNotifier),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        let engine = Arc::new(AlertEngine::new(
            Arc::new(SharedSnapshot::new(1450.0)),
            cache,
            coordinator,
            Arc::new(ViewerHub::new()),
        ));
        FeedConnector::new(
            Arc::new(BinanceTrades::new("wss://stream.binance.com:9443", "BTCUSDT")),
            engine,
            Arc::new(FixedChange(-1.25)),
            Duration::from_millis(10),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn trade_frames_update_owned_price() {
        let feed = connector();
        feed.handle_payload(r#"{"e":"trade","s":"BTCUSDT","p":"51000.5"}"#).await;
        feed.handle_payload("not json").await;
        feed.handle_payload(r#"{"e":"trade","s":"BTCUSDT","p":"0"}"#).await;

        let snapshot = feed.engine.current_snapshot();
        assert_eq!(snapshot.usd, Some(51000.5));
        assert_eq!(snapshot.krw, None);
    }

    #[tokio::test]
    async fn change_refresh_writes_immediately() {
        let feed = connector();
        let task = feed.spawn_change_refresh();
        tokio::time::sleep(Duration::from_millis(50)).await;
        task.abort();

        assert_eq!(feed.engine.current_snapshot().change_24h.usd, Some(-1.25));
    }
}
