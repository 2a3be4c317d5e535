use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::api::upbit::rest::MAX_CANDLES;

/// Upstream endpoints and credentials.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub upbit_ws_url: String,
    pub upbit_api_url: String,
    pub upbit_market: String,
    pub binance_ws_url: String,
    pub binance_api_url: String,
    pub binance_symbol: String,
    pub coinmarketcap_api_url: String,
    pub coinmarketcap_api_key: Option<String>,
    pub glassnode_api_url: String,
    pub glassnode_api_key: Option<String>,
    pub fear_greed_url: String,
    pub exchange_rate_url: String,
    pub http_timeout: Duration,
}

/// Process configuration derived from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub api: ApiConfig,

    // ── Ingestion ──────────────────────────────────────────────────
    pub reconnect_delay: Duration,
    pub change_refresh: Duration,
    pub default_usd_krw_rate: f64,
    pub rolling_high_days: usize,
    pub supervisor_restart_delay: Duration,
    /// Upper bound on one poller fetch, including indicator math.
    pub poll_timeout: Duration,

    // ── Alerts ─────────────────────────────────────────────────────
    pub alert_cache_ttl: Duration,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,

    // ── Broadcast ──────────────────────────────────────────────────
    pub broadcast_interval: Duration,

    // ── Notifier ───────────────────────────────────────────────────
    /// Legacy FCM server key. Empty ⇒ FCM disabled.
    pub fcm_server_key: Option<String>,
    pub fcm_url: String,
    pub slack_webhook_url: Option<String>,
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_opt(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(env_u64(name, default).max(1))
}

fn env_millis(name: &str, default: u64) -> Duration {
    Duration::from_millis(env_u64(name, default).max(1))
}

impl AppConfig {
    pub fn from_env() -> Self {
        let api = ApiConfig {
            upbit_ws_url: env_str("UPBIT_WS_URL", "wss://api.upbit.com/websocket/v1"),
            upbit_api_url: env_str("UPBIT_API_URL", "https://api.upbit.com/v1"),
            upbit_market: env_str("UPBIT_MARKET", "KRW-BTC"),
            binance_ws_url: env_str("BINANCE_WS_URL", "wss://stream.binance.com:9443"),
            binance_api_url: env_str("BINANCE_API_URL", "https://api.binance.com/api/v3"),
            binance_symbol: env_str("BINANCE_SYMBOL", "BTCUSDT"),
            coinmarketcap_api_url: env_str(
                "COINMARKETCAP_API_URL",
                "https://pro-api.coinmarketcap.com/v1",
            ),
            coinmarketcap_api_key: env_opt("COINMARKETCAP_API_KEY"),
            glassnode_api_url: env_str("GLASSNODE_API_URL", "https://api.glassnode.com/v1"),
            glassnode_api_key: env_opt("GLASSNODE_API_KEY"),
            fear_greed_url: env_str("FEAR_GREED_URL", "https://api.alternative.me/fng/"),
            exchange_rate_url: env_str(
                "EXCHANGE_RATE_API_URL",
                "https://open.er-api.com/v6/latest/USD",
            ),
            http_timeout: env_secs("ALERTWATCH_HTTP_TIMEOUT_SECS", 10),
        };

        Self {
            bind: env_str("ALERTWATCH_BIND", "127.0.0.1"),
            port: env_u16("ALERTWATCH_PORT", 8765),
            db_path: PathBuf::from(env_str("ALERTWATCH_DB", "alertwatch.db")),
            api,
            reconnect_delay: env_secs("ALERTWATCH_RECONNECT_SECS", 5),
            change_refresh: env_secs("ALERTWATCH_CHANGE_REFRESH_SECS", 60),
            default_usd_krw_rate: env_f64("DEFAULT_USD_KRW_RATE", 1450.0),
            rolling_high_days: (env_u64("ALERTWATCH_HIGH_DAYS", 90) as usize).clamp(1, MAX_CANDLES),
            supervisor_restart_delay: env_secs("ALERTWATCH_RESTART_SECS", 5),
            poll_timeout: env_secs("ALERTWATCH_POLL_TIMEOUT_SECS", 30),
            alert_cache_ttl: env_secs("ALERTWATCH_ALERT_CACHE_TTL_SECS", 30),
            store_timeout: env_secs("ALERTWATCH_STORE_TIMEOUT_SECS", 5),
            notify_timeout: env_secs("ALERTWATCH_NOTIFY_TIMEOUT_SECS", 10),
            broadcast_interval: env_millis("ALERTWATCH_BROADCAST_MS", 1000),
            fcm_server_key: env_opt("FCM_SERVER_KEY"),
            fcm_url: env_str("FCM_URL", "https://fcm.googleapis.com/fcm/send"),
            slack_webhook_url: env_opt("SLACK_WEBHOOK_URL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_environment() {
        let cfg = AppConfig::from_env();
        assert!(cfg.rolling_high_days >= 1 && cfg.rolling_high_days <= MAX_CANDLES);
        assert!(cfg.broadcast_interval >= Duration::from_millis(1));
        assert!(cfg.api.binance_api_url.starts_with("http"));
    }

    #[test]
    fn blank_values_fall_back_to_default() {
        assert_eq!(env_str("ALERTWATCH_TEST_UNSET_VAR", "fallback"), "fallback");
        assert_eq!(env_opt("ALERTWATCH_TEST_UNSET_VAR"), None);
        assert_eq!(env_secs("ALERTWATCH_TEST_UNSET_VAR", 0), Duration::from_secs(1));
    }
}
