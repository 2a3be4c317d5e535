use reqwest::Client;
use serde::Deserialize;

use crate::api::get_json;
use crate::config::ApiConfig;
use crate::error::{AlertWatchError, Result};
use crate::market::{Candle, RsiInterval};

/// Upbit returns at most this many candles per request.
pub const MAX_CANDLES: usize = 200;

#[derive(Debug, Deserialize)]
struct Ticker {
    change_rate: f64,
}

#[derive(Debug, Deserialize)]
struct UpbitCandle {
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
    candle_acc_trade_volume: f64,
    timestamp: i64,
}

/// Signed 24h change in percent. Upbit reports `change_rate` as a fraction.
pub async fn change_24h(http: &Client, config: &ApiConfig) -> Result<f64> {
    let url = format!("{}/ticker", config.upbit_api_url);
    let tickers: Vec<Ticker> = get_json(
        http.get(url).query(&[("markets", config.upbit_market.as_str())]),
        "Upbit ticker",
    )
    .await?;
    parse_change(&tickers)
}

fn parse_change(tickers: &[Ticker]) -> Result<f64> {
    let ticker = tickers
        .first()
        .ok_or_else(|| AlertWatchError::Parse("empty Upbit ticker response".to_string()))?;
    Ok((ticker.change_rate * 100.0 * 100.0).round() / 100.0)
}

fn candle_path(interval: RsiInterval) -> &'static str {
    match interval {
        RsiInterval::M15 => "candles/minutes/15",
        RsiInterval::H1 => "candles/minutes/60",
        RsiInterval::H4 => "candles/minutes/240",
        RsiInterval::D1 => "candles/days",
    }
}

pub async fn candles(
    http: &Client,
    config: &ApiConfig,
    interval: RsiInterval,
    limit: usize,
) -> Result<Vec<Candle>> {
    let url = format!("{}/{}", config.upbit_api_url, candle_path(interval));
    let rows: Vec<UpbitCandle> = get_json(
        http.get(url).query(&[
            ("market", config.upbit_market.clone()),
            ("count", limit.min(MAX_CANDLES).to_string()),
        ]),
        "Upbit candles",
    )
    .await?;
    Ok(into_candles(rows))
}

/// Upbit lists newest first; everything downstream expects oldest first.
fn into_candles(rows: Vec<UpbitCandle>) -> Vec<Candle> {
    rows.into_iter()
        .rev()
        .map(|c| Candle {
            open: c.opening_price,
            high: c.high_price,
            low: c.low_price,
            close: c.trade_price,
            volume: c.candle_acc_trade_volume,
            timestamp: c.timestamp,
        })
        .collect()
}
