use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::Result;
use crate::ingest::feed::Venue;
use crate::market::Currency;

#[derive(Debug, Deserialize)]
struct TradeData {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    trade_price: Option<f64>,
}

/// Upbit public trade stream. Upbit requires a subscription frame after
/// connecting and delivers payloads as binary JSON.
pub struct UpbitTrades {
    url: String,
    market: String,
}

impl UpbitTrades {
    pub fn new(url: &str, market: &str) -> Self {
        Self {
            url: url.to_string(),
            market: market.to_string(),
        }
    }
}

impl Venue for UpbitTrades {
    fn name(&self) -> &'static str {
        "upbit"
    }

    fn currency(&self) -> Currency {
        Currency::Krw
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn subscription(&self) -> Option<String> {
        Some(
            json!([
                { "ticket": Uuid::new_v4().to_string() },
                { "type": "trade", "codes": [self.market], "isOnlyRealtime": true }
            ])
            .to_string(),
        )
    }

    fn parse_trade(&self, payload: &str) -> Result<Option<f64>> {
        let trade: TradeData = serde_json::from_str(payload)?;
        if trade.kind.as_deref() != Some("trade") {
            // Status frames such as {"status":"UP"}.
            return Ok(None);
        }
        log::trace!(
            "{} trade @ {:?}",
            trade.code.as_deref().unwrap_or("?"),
            trade.trade_price
        );
        Ok(trade.trade_price)
    }
}
