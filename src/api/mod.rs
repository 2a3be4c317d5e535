pub mod binance;
pub mod global;
pub mod upbit;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use crate::config::ApiConfig;
use crate::error::{AlertWatchError, Result};
use crate::market::{Candle, Currency, FearGreed, RsiInterval};

/// One-shot REST data the pollers and feed connectors depend on.
#[async_trait]
pub trait MarketSource: Send + Sync {
    /// 24h change in percent for the market quoted in `currency`.
    async fn change_24h(&self, currency: Currency) -> Result<f64>;

    /// Closed and in-progress candles, oldest first.
    async fn candles(
        &self,
        currency: Currency,
        interval: RsiInterval,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    async fn dominance(&self) -> Result<f64>;

    async fn mvrv(&self) -> Result<f64>;

    async fn fear_greed(&self) -> Result<FearGreed>;

    async fn usd_krw_rate(&self) -> Result<f64>;
}

/// Send `req` and decode a JSON body, turning non-2xx into `Upstream`.
pub(crate) async fn get_json<T: DeserializeOwned>(
    req: RequestBuilder,
    service: &'static str,
) -> Result<T> {
    let resp = req.send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(AlertWatchError::Upstream {
            service,
            status: status.as_u16(),
        });
    }
    Ok(resp.json::<T>().await?)
}

pub(crate) fn parse_decimal(raw: &str, what: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|e| AlertWatchError::Parse(format!("invalid {} '{}': {}", what, raw, e)))
}

/// Production [`MarketSource`] talking to Binance, Upbit and the global
/// metric providers over HTTP.
pub struct HttpMarketSource {
    http: Client,
    config: ApiConfig,
}

impl HttpMarketSource {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl MarketSource for HttpMarketSource {
    async fn change_24h(&self, currency: Currency) -> Result<f64> {
        match currency {
            Currency::Krw => upbit::rest::change_24h(&self.http, &self.config).await,
            Currency::Usd => binance::rest::change_24h(&self.http, &self.config).await,
        }
    }

    async fn candles(
        &self,
        currency: Currency,
        interval: RsiInterval,
        limit: usize,
    ) -> Result<Vec<Candle>> {
        match currency {
            Currency::Krw => upbit::rest::candles(&self.http, &self.config, interval, limit).await,
            Currency::Usd => {
                binance::rest::klines(&self.http, &self.config, interval, limit).await
            }
        }
    }

    async fn dominance(&self) -> Result<f64> {
        global::btc_dominance(&self.http, &self.config).await
    }

    async fn mvrv(&self) -> Result<f64> {
        global::mvrv(&self.http, &self.config).await
    }

    async fn fear_greed(&self) -> Result<FearGreed> {
        global::fear_greed(&self.http, &self.config).await
    }

    async fn usd_krw_rate(&self) -> Result<f64> {
        global::usd_krw_rate(&self.http, &self.config).await
    }
}
