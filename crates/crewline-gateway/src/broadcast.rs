use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crewline_db::Store;
use crewline_types::events::ChannelEvent;

use crate::registry::{ConnectionHandle, ConnectionRegistry};

/// Fans events out to the live connections of a channel's active members.
/// Fire-and-forget: enqueue failures are counted, never surfaced, and
/// nothing here blocks on socket I/O.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
    store: Arc<dyn Store>,
    dropped: Arc<AtomicU64>,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            registry,
            store,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Deliver `event` to every active member of `channel_id` with a live
    /// connection, skipping `exclude` (normally the sender, whose HTTP
    /// response is its echo). In degraded mode — store not durable, or
    /// membership resolution failing — the event goes to every registered
    /// connection instead: over-delivery traded for availability.
    pub async fn publish(&self, channel_id: i64, event: ChannelEvent, exclude: Option<i64>) {
        if !self.store.health().is_healthy() {
            debug!(channel_id, "degraded mode: fanning out to all connections");
            self.publish_all(event, exclude).await;
            return;
        }

        let member_ids = {
            let store = self.store.clone();
            tokio::task::spawn_blocking(move || store.active_member_ids(channel_id)).await
        };

        let member_ids = match member_ids {
            Ok(Ok(ids)) => ids,
            Ok(Err(e)) => {
                warn!(channel_id, error = %e, "membership resolution failed, degraded fan-out");
                self.publish_all(event, exclude).await;
                return;
            }
            Err(e) => {
                warn!(channel_id, error = %e, "membership lookup task failed, degraded fan-out");
                self.publish_all(event, exclude).await;
                return;
            }
        };

        for user_id in member_ids {
            if exclude == Some(user_id) {
                continue;
            }
            if let Some(handle) = self.registry.lookup(user_id).await {
                self.deliver(user_id, &handle, &event);
            }
        }
    }

    /// Deliver to every registered connection. Used for global events
    /// (presence) and as the degraded-mode path.
    pub async fn publish_all(&self, event: ChannelEvent, exclude: Option<i64>) {
        for (user_id, handle) in self.registry.all().await {
            if exclude == Some(user_id) {
                continue;
            }
            self.deliver(user_id, &handle, &event);
        }
    }

    fn deliver(&self, user_id: i64, handle: &ConnectionHandle, event: &ChannelEvent) {
        if !handle.enqueue(event.clone()) {
            let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(user_id, total_dropped = total, "outbound queue full, event dropped");
        }
    }

    /// Events that never made it onto an outbound queue.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
