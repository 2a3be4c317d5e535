use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{get_json, parse_decimal};
use crate::config::ApiConfig;
use crate::error::{AlertWatchError, Result};
use crate::market::{Candle, RsiInterval};

#[derive(Debug, Deserialize)]
struct Ticker24h {
    #[serde(rename = "priceChangePercent")]
    price_change_percent: String,
}

pub async fn change_24h(http: &Client, config: &ApiConfig) -> Result<f64> {
    let url = format!("{}/ticker/24hr", config.binance_api_url);
    let ticker: Ticker24h = get_json(
        http.get(url).query(&[("symbol", config.binance_symbol.as_str())]),
        "Binance 24h ticker",
    )
    .await?;
    let change = parse_decimal(&ticker.price_change_percent, "priceChangePercent")?;
    Ok((change * 100.0).round() / 100.0)
}

pub async fn klines(
    http: &Client,
    config: &ApiConfig,
    interval: RsiInterval,
    limit: usize,
) -> Result<Vec<Candle>> {
    let url = format!("{}/klines", config.binance_api_url);
    let rows: Vec<Vec<Value>> = get_json(
        http.get(url).query(&[
            ("symbol", config.binance_symbol.clone()),
            ("interval", interval.as_str().to_string()),
            ("limit", limit.min(1000).to_string()),
        ]),
        "Binance klines",
    )
    .await?;
    parse_klines(&rows)
}

/// Kline rows are `[open_time, open, high, low, close, volume, ...]` with
/// prices as strings, oldest first.
pub(crate) fn parse_klines(rows: &[Vec<Value>]) -> Result<Vec<Candle>> {
    rows.iter().map(|row| parse_kline(row)).collect()
}

fn parse_kline(row: &[Value]) -> Result<Candle> {
    let field = |i: usize, name: &str| -> Result<f64> {
        match row.get(i) {
            Some(Value::String(s)) => parse_decimal(s, name),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| AlertWatchError::Parse(format!("kline {} out of range", name))),
            _ => Err(AlertWatchError::Parse(format!("kline missing {}", name))),
        }
    };

    Ok(Candle {
        timestamp: row.first().and_then(Value::as_i64).unwrap_or_default(),
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}
