//! Snapshot fan-out to connected viewers.

pub mod server;

use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::market::{MarketSnapshot, SharedSnapshot};

pub type ViewerId = Uuid;

/// Serialized snapshots go out on this channel; the receiving half is
/// drained by the viewer's socket task.
pub type ViewerSender = mpsc::UnboundedSender<String>;

#[derive(Default)]
pub struct ViewerHub {
    viewers: RwLock<HashMap<ViewerId, ViewerSender>>,
}

fn encode(snapshot: &MarketSnapshot) -> Option<String> {
    match serde_json::to_string(snapshot) {
        Ok(json) => Some(json),
        Err(e) => {
            error!("Failed to serialize snapshot: {}", e);
            None
        }
    }
}

impl ViewerHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a viewer and send it `initial` right away.
    pub async fn subscribe(&self, sender: ViewerSender, initial: &MarketSnapshot) -> ViewerId {
        let id = Uuid::new_v4();
        if let Some(json) = encode(initial) {
            // A failed send here is cleaned up by the next broadcast.
            let _ = sender.send(json);
        }
        let mut viewers = self.viewers.write().await;
        viewers.insert(id, sender);
        info!("Viewer {} subscribed, total viewers: {}", id, viewers.len());
        id
    }

    pub async fn unsubscribe(&self, id: ViewerId) {
        let mut viewers = self.viewers.write().await;
        if viewers.remove(&id).is_some() {
            info!("Viewer {} unsubscribed, total viewers: {}", id, viewers.len());
        }
    }

    /// Send to every viewer, dropping the ones whose channel is closed.
    /// Returns how many viewers received the snapshot.
    pub async fn broadcast(&self, snapshot: &MarketSnapshot) -> usize {
        let Some(json) = encode(snapshot) else {
            return 0;
        };

        let viewers = self.viewers.read().await;
        let mut failed = Vec::new();
        for (id, sender) in viewers.iter() {
            if sender.send(json.clone()).is_err() {
                failed.push(*id);
            }
        }
        let delivered = viewers.len() - failed.len();
        drop(viewers);

        if !failed.is_empty() {
            let mut viewers = self.viewers.write().await;
            for id in failed {
                viewers.remove(&id);
                debug!("Removed disconnected viewer {}", id);
            }
        }
        delivered
    }

    pub async fn viewer_count(&self) -> usize {
        self.viewers.read().await.len()
    }
}

/// Push the current snapshot to all viewers every `every`, regardless of
/// how often producers update it.
pub async fn run_broadcast(hub: Arc<ViewerHub>, snapshot: Arc<SharedSnapshot>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        if hub.viewer_count().await == 0 {
            continue;
        }
        hub.broadcast(&snapshot.snapshot()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Currency;

    #[tokio::test]
    async fn new_viewer_gets_immediate_snapshot() {
        let hub = ViewerHub::new();
        let shared = SharedSnapshot::new(1450.0);
        shared.set_price(Currency::Usd, 51_000.0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.subscribe(tx, &shared.snapshot()).await;

        let first: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(first["usd"], 51_000.0);
        assert_eq!(hub.viewer_count().await, 1);
    }

    #[tokio::test]
    async fn failed_viewer_is_removed_without_affecting_others() {
        let hub = ViewerHub::new();
        let snapshot = MarketSnapshot::default();

        let (live_tx, mut live_rx) = mpsc::unbounded_channel();
        let (dead_tx, dead_rx) = mpsc::unbounded_channel();
        hub.subscribe(live_tx, &snapshot).await;
        hub.subscribe(dead_tx, &snapshot).await;
        drop(dead_rx);

        assert_eq!(hub.broadcast(&snapshot).await, 1);
        assert_eq!(hub.viewer_count().await, 1);

        // Initial snapshot plus the broadcast.
        assert!(live_rx.recv().await.is_some());
        assert!(live_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_removes_viewer() {
        let hub = ViewerHub::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let id = hub.subscribe(tx, &MarketSnapshot::default()).await;
        hub.unsubscribe(id).await;
        assert_eq!(hub.viewer_count().await, 0);
    }
}
