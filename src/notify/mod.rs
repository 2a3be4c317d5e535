pub mod message;

pub use message::{render, AlertMessage, Locale};

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AlertWatchError, Result};

/// Best-effort delivery of one rendered alert.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, token: &str, title: &str, body: &str) -> Result<()>;
}

/// Firebase Cloud Messaging, legacy HTTP endpoint.
pub struct FcmNotifier {
    http: Client,
    url: String,
    server_key: String,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    error: Option<String>,
}

impl FcmNotifier {
    pub fn new(http: Client, url: &str, server_key: &str) -> Self {
        Self {
            http,
            url: url.to_string(),
            server_key: server_key.to_string(),
        }
    }
}

fn check_fcm(resp: &FcmResponse) -> Result<()> {
    if resp.failure == 0 {
        return Ok(());
    }
    let reason = resp
        .results
        .iter()
        .find_map(|r| r.error.clone())
        .unwrap_or_else(|| "unknown".to_string());
    Err(AlertWatchError::Notify(format!("FCM rejected message: {}", reason)))
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn deliver(&self, token: &str, title: &str, body: &str) -> Result<()> {
        let payload = json!({
            "to": token,
            "notification": { "title": title, "body": body },
        });
        let resp = self
            .http
            .post(&self.url)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&payload)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AlertWatchError::Upstream {
                service: "FCM",
                status: status.as_u16(),
            });
        }
        check_fcm(&resp.json::<FcmResponse>().await?)
    }
}

/// Posts alerts to a Slack incoming webhook. The device token is ignored.
pub struct SlackNotifier {
    http: Client,
    webhook_url: String,
}

impl SlackNotifier {
    pub fn new(http: Client, webhook_url: &str) -> Self {
        Self {
            http,
            webhook_url: webhook_url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    async fn deliver(&self, _token: &str, title: &str, body: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&json!({ "text": format!("*{}*\n{}", title, body) }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(AlertWatchError::Upstream {
                service: "Slack",
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Used when no transport is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, token: &str, title: &str, body: &str) -> Result<()> {
        info!("[{}] -> {}: {}", title, token, body);
        Ok(())
    }
}

/// FCM when a server key is set, else Slack when a webhook is set, else log.
pub fn from_config(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let http = Client::builder().timeout(config.notify_timeout).build()?;

    if let Some(key) = &config.fcm_server_key {
        info!("Push notifications via FCM");
        return Ok(Arc::new(FcmNotifier::new(http, &config.fcm_url, key)));
    }
    if let Some(webhook) = &config.slack_webhook_url {
        info!("Alert notifications via Slack webhook");
        return Ok(Arc::new(SlackNotifier::new(http, webhook)));
    }

    warn!("No FCM_SERVER_KEY or SLACK_WEBHOOK_URL set; alerts will only be logged");
    Ok(Arc::new(LogNotifier))
}
