//! Market-wide metrics that do not come from a trading venue.

use reqwest::Client;
use serde::Deserialize;

use crate::api::{get_json, parse_decimal};
use crate::config::ApiConfig;
use crate::error::{AlertWatchError, Result};
use crate::market::FearGreed;

#[derive(Debug, Deserialize)]
struct GlobalMetrics {
    data: GlobalMetricsData,
}

#[derive(Debug, Deserialize)]
struct GlobalMetricsData {
    btc_dominance: f64,
}

#[derive(Debug, Deserialize)]
struct MetricPoint {
    #[allow(dead_code)]
    t: i64,
    v: f64,
}

#[derive(Debug, Deserialize)]
struct FearGreedResponse {
    data: Vec<FearGreedEntry>,
}

#[derive(Debug, Deserialize)]
struct FearGreedEntry {
    value: String,
    value_classification: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRates {
    rates: std::collections::HashMap<String, f64>,
}

/// BTC dominance (%) from CoinMarketCap global metrics.
pub async fn btc_dominance(http: &Client, config: &ApiConfig) -> Result<f64> {
    let key = config
        .coinmarketcap_api_key
        .as_deref()
        .ok_or(AlertWatchError::MissingCredential("COINMARKETCAP_API_KEY"))?;
    let url = format!("{}/global-metrics/quotes/latest", config.coinmarketcap_api_url);
    let metrics: GlobalMetrics = get_json(
        http.get(url).header("X-CMC_PRO_API_KEY", key),
        "CoinMarketCap",
    )
    .await?;
    Ok((metrics.data.btc_dominance * 100.0).round() / 100.0)
}

/// Latest MVRV ratio from Glassnode.
pub async fn mvrv(http: &Client, config: &ApiConfig) -> Result<f64> {
    let key = config
        .glassnode_api_key
        .as_deref()
        .ok_or(AlertWatchError::MissingCredential("GLASSNODE_API_KEY"))?;
    let url = format!("{}/metrics/market/mvrv", config.glassnode_api_url);
    let points: Vec<MetricPoint> = get_json(
        http.get(url).query(&[("a", "BTC"), ("i", "24h"), ("api_key", key)]),
        "Glassnode",
    )
    .await?;
    latest_point(&points)
}

fn latest_point(points: &[MetricPoint]) -> Result<f64> {
    points
        .last()
        .map(|p| (p.v * 100.0).round() / 100.0)
        .ok_or_else(|| AlertWatchError::Parse("empty MVRV series".to_string()))
}

pub async fn fear_greed(http: &Client, config: &ApiConfig) -> Result<FearGreed> {
    let resp: FearGreedResponse = get_json(
        http.get(&config.fear_greed_url).query(&[("limit", "1")]),
        "alternative.me",
    )
    .await?;
    parse_fear_greed(resp)
}

fn parse_fear_greed(resp: FearGreedResponse) -> Result<FearGreed> {
    let entry = resp
        .data
        .into_iter()
        .next()
        .ok_or_else(|| AlertWatchError::Parse("empty fear & greed response".to_string()))?;
    let value = parse_decimal(&entry.value, "fear & greed value")?;
    if !(0.0..=100.0).contains(&value) {
        return Err(AlertWatchError::Parse(format!(
            "fear & greed value {} out of range",
            value
        )));
    }
    Ok(FearGreed {
        value: value.round() as u8,
        classification: entry.value_classification,
    })
}

pub async fn usd_krw_rate(http: &Client, config: &ApiConfig) -> Result<f64> {
    let rates: ExchangeRates = get_json(http.get(&config.exchange_rate_url), "exchange rate API").await?;
    krw_rate(&rates)
}

fn krw_rate(rates: &ExchangeRates) -> Result<f64> {
    rates
        .rates
        .get("KRW")
        .copied()
        .filter(|rate| *rate > 0.0)
        .ok_or_else(|| AlertWatchError::Parse("no KRW rate in response".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_metrics() {
        let metrics: GlobalMetrics = serde_json::from_str(
            r#"{"status":{"error_code":0},"data":{"btc_dominance":54.3219,"eth_dominance":17.1}}"#,
        )
        .unwrap();
        assert_eq!(metrics.data.btc_dominance, 54.3219);
    }

    #[test]
    fn mvrv_takes_latest_point() {
        let points: Vec<MetricPoint> =
            serde_json::from_str(r#"[{"t":1,"v":2.1},{"t":2,"v":2.456}]"#).unwrap();
        assert_eq!(latest_point(&points).unwrap(), 2.46);
        assert!(latest_point(&[]).is_err());
    }

    #[test]
    fn parses_fear_greed_index() {
        let resp: FearGreedResponse = serde_json::from_str(
            r#"{"name":"Fear and Greed Index","data":[{"value":"72","value_classification":"Greed","timestamp":"1700000000"}]}"#,
        )
        .unwrap();
        let index = parse_fear_greed(resp).unwrap();
        assert_eq!(index.value, 72);
        assert_eq!(index.classification, "Greed");
    }

    #[test]
    fn rejects_missing_krw_rate() {
        let rates: ExchangeRates =
            serde_json::from_str(r#"{"result":"success","rates":{"USD":1.0,"KRW":1391.5}}"#).unwrap();
        assert_eq!(krw_rate(&rates).unwrap(), 1391.5);

        let rates: ExchangeRates = serde_json::from_str(r#"{"rates":{"USD":1.0}}"#).unwrap();
        assert!(krw_rate(&rates).is_err());
    }
}
