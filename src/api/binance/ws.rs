use serde::Deserialize;

use crate::api::parse_decimal;
use crate::error::Result;
use crate::ingest::feed::Venue;
use crate::market::Currency;

#[derive(Debug, Deserialize)]
struct TradeData {
    #[serde(rename = "e")]
    event: String,
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "p")]
    price: String,
}

/// Raw trade stream, e.g. `wss://stream.binance.com:9443/ws/btcusdt@trade`.
/// The stream is selected by URL so no subscription frame is sent.
pub struct BinanceTrades {
    url: String,
}

impl BinanceTrades {
    pub fn new(base_url: &str, symbol: &str) -> Self {
        Self {
            url: format!(
                "{}/ws/{}@trade",
                base_url.trim_end_matches('/'),
                symbol.to_lowercase()
            ),
        }
    }
}

impl Venue for BinanceTrades {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn currency(&self) -> Currency {
        Currency::Usd
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscription(&self) -> Option<String> {
        None
    }

    fn parse_trade(&self, payload: &str) -> Result<Option<f64>> {
        let trade: TradeData = serde_json::from_str(payload)?;
        if trade.event != "trade" {
            return Ok(None);
        }
        log::trace!("{} trade @ {}", trade.symbol, trade.price);
        parse_decimal(&trade.price, "Binance trade price").map(Some)
    }
}
