//! Fire-and-deactivate, at most once per activation.
//!
//! One process-wide lock covers "re-read active flag, conditional
//! deactivate, invalidate cache". It is released before the notifier runs.

use chrono::Utc;
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::cache::AlertCache;
use super::model::AlertCondition;
use super::store::{AlertStore, Deactivation};
use crate::error::{AlertWatchError, Result};
use crate::notify::{render, Notifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// Deactivated by this call; notification was attempted.
    Fired,
    /// Another caller won the race or the alert was toggled off.
    AlreadyInactive,
    /// Storage failed; the alert remains active.
    StoreFailed,
}

pub struct TriggerCoordinator {
    store: Arc<dyn AlertStore>,
    cache: Arc<AlertCache>,
    notifier: Arc<dyn Notifier>,
    lock: Mutex<()>,
    store_timeout: Duration,
    notify_timeout: Duration,
}

async fn bounded<T>(
    limit: Duration,
    what: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| AlertWatchError::Timeout(what))?
}

impl TriggerCoordinator {
    pub fn new(
        store: Arc<dyn AlertStore>,
        cache: Arc<AlertCache>,
        notifier: Arc<dyn Notifier>,
        store_timeout: Duration,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            store,
            cache,
            notifier,
            lock: Mutex::new(()),
            store_timeout,
            notify_timeout,
        }
    }

    /// Run [`trigger`](Self::trigger) on its own task so the caller can keep
    /// evaluating.
    pub fn dispatch(self: &Arc<Self>, condition: AlertCondition, value: f64) -> JoinHandle<TriggerOutcome> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move { coordinator.trigger(condition, value).await })
    }

    pub async fn trigger(&self, condition: AlertCondition, value: f64) -> TriggerOutcome {
        {
            let _guard = self.lock.lock().await;
            match self.deactivate(&condition).await {
                Ok(Deactivation::Deactivated) => {}
                Ok(Deactivation::Conflict) => {
                    debug!("Alert {} already inactive, skipping", condition.id);
                    return TriggerOutcome::AlreadyInactive;
                }
                Err(e) => {
                    error!("Failed to deactivate alert {}: {}", condition.id, e);
                    return TriggerOutcome::StoreFailed;
                }
            }
            self.cache.invalidate();
        }

        info!(
            "Alert {} fired: {:?} {} {} (observed {})",
            condition.id, condition.kind, condition.direction, condition.threshold, value
        );
        if let Err(e) = self.notify(&condition).await {
            warn!("Notification for alert {} failed: {}", condition.id, e);
        }
        TriggerOutcome::Fired
    }

    async fn deactivate(&self, condition: &AlertCondition) -> Result<Deactivation> {
        let current = bounded(self.store_timeout, "alert lookup", self.store.get(condition.id)).await?;
        if !current.map_or(false, |c| c.active) {
            return Ok(Deactivation::Conflict);
        }
        bounded(
            self.store_timeout,
            "alert deactivation",
            self.store.deactivate(condition.id, Utc::now()),
        )
        .await
    }

    async fn notify(&self, condition: &AlertCondition) -> Result<()> {
        let recipient = bounded(
            self.store_timeout,
            "recipient lookup",
            self.store.recipient(condition.owner_id),
        )
        .await?;

        let Some(recipient) = recipient else {
            info!("Alert {}: owner {} not found, nothing to deliver", condition.id, condition.owner_id);
            return Ok(());
        };
        let Some(token) = recipient.push_token else {
            info!("Alert {}: owner {} has no push token", condition.id, condition.owner_id);
            return Ok(());
        };

        let message = render(condition, recipient.locale);
        bounded(
            self.notify_timeout,
            "notification delivery",
            self.notifier.deliver(&token, &message.title, &message.body),
        )
        .await?;
        debug!("Alert {} delivered to owner {}", condition.id, condition.owner_id);
        Ok(())
    }
}
