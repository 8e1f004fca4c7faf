use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::{Notify, RwLock};
use uuid::Uuid;

use crewline_types::events::ChannelEvent;

/// Default bound on each connection's outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// One live connection's server side: a bounded outbound queue drained by a
/// single writer task. Cheap to clone; all clones share the same queue.
#[derive(Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    queue: Arc<OutboundQueue>,
}

struct OutboundQueue {
    capacity: usize,
    events: std::sync::Mutex<VecDeque<ChannelEvent>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl ConnectionHandle {
    pub fn new(capacity: usize) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            queue: Arc::new(OutboundQueue {
                capacity,
                events: std::sync::Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    /// Enqueue without blocking. When the queue is full, the oldest
    /// non-critical event (typing/presence) is evicted first; if none
    /// exists, the incoming event itself is dropped. Returns false iff the
    /// event was not enqueued.
    pub fn enqueue(&self, event: ChannelEvent) -> bool {
        if self.queue.closed.load(Ordering::Acquire) {
            return false;
        }

        let enqueued = {
            let mut events = match self.queue.events.lock() {
                Ok(events) => events,
                Err(_) => return false,
            };
            if events.len() >= self.queue.capacity {
                if let Some(pos) = events.iter().position(|e| !e.is_critical()) {
                    events.remove(pos);
                    self.queue.dropped.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.queue.dropped.fetch_add(1, Ordering::Relaxed);
                    return false;
                }
            }
            events.push_back(event);
            true
        };

        if enqueued {
            self.queue.notify.notify_one();
        }
        enqueued
    }

    /// Wait for the next outbound event. Returns `None` once the handle is
    /// closed and the queue has drained.
    pub async fn next_event(&self) -> Option<ChannelEvent> {
        loop {
            let notified = self.queue.notify.notified();
            {
                let mut events = self.queue.events.lock().ok()?;
                if let Some(event) = events.pop_front() {
                    return Some(event);
                }
                if self.queue.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting events and wake the writer task. Already-queued
    /// events still drain; an enqueue racing with close is simply dropped.
    pub fn close(&self) {
        self.queue.closed.store(true, Ordering::Release);
        self.queue.notify.notify_waiters();
    }

    /// Events evicted or rejected due to backpressure, for the log line on
    /// disconnect.
    pub fn dropped_events(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

/// Tracks the single live connection per authenticated user. Injectable so
/// every test constructs its own isolated instance; never a global.
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<HashMap<i64, ConnectionHandle>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a user's connection, replacing any prior one
    /// (single-session-per-user). Returns the previous handle, if any, so
    /// the caller can close it.
    pub async fn register(&self, user_id: i64, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        self.inner.write().await.insert(user_id, handle)
    }

    /// Remove the mapping only if `conn_id` still owns it. A stale
    /// disconnect from a replaced session never evicts the newer one.
    /// Returns true iff the mapping was removed.
    pub async fn unregister(&self, user_id: i64, conn_id: Uuid) -> bool {
        let mut connections = self.inner.write().await;
        match connections.get(&user_id) {
            Some(current) if current.conn_id() == conn_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    pub async fn lookup(&self, user_id: i64) -> Option<ConnectionHandle> {
        self.inner.read().await.get(&user_id).cloned()
    }

    /// All live handles with their user ids — the degraded-mode fan-out set.
    pub async fn all(&self) -> Vec<(i64, ConnectionHandle)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(&user_id, handle)| (user_id, handle.clone()))
            .collect()
    }

    pub async fn connected_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing(user_id: i64) -> ChannelEvent {
        ChannelEvent::TypingStart {
            channel_id: 1,
            user_id,
        }
    }

    fn reaction(message_id: i64) -> ChannelEvent {
        ChannelEvent::ReactionAdded {
            channel_id: 1,
            message_id,
            user_id: 21,
            kind: "thumbsup".into(),
        }
    }

    #[tokio::test]
    async fn register_replaces_and_returns_previous_handle() {
        let registry = ConnectionRegistry::new();
        let first = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);
        let second = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);

        assert!(registry.register(21, first.clone()).await.is_none());
        let previous = registry.register(21, second.clone()).await.unwrap();
        assert_eq!(previous.conn_id(), first.conn_id());
        assert_eq!(registry.connected_count().await, 1);
        assert_eq!(
            registry.lookup(21).await.unwrap().conn_id(),
            second.conn_id()
        );
    }

    #[tokio::test]
    async fn stale_unregister_does_not_evict_newer_session() {
        let registry = ConnectionRegistry::new();
        let old = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);
        let new = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);

        registry.register(21, old.clone()).await;
        registry.register(21, new.clone()).await;

        assert!(!registry.unregister(21, old.conn_id()).await);
        assert!(registry.lookup(21).await.is_some());

        assert!(registry.unregister(21, new.conn_id()).await);
        assert!(registry.lookup(21).await.is_none());
    }

    #[tokio::test]
    async fn full_queue_evicts_oldest_noncritical_first() {
        let handle = ConnectionHandle::new(3);
        assert!(handle.enqueue(typing(1)));
        assert!(handle.enqueue(reaction(10)));
        assert!(handle.enqueue(typing(2)));

        // Queue full: the oldest typing event makes room.
        assert!(handle.enqueue(reaction(11)));
        assert_eq!(handle.dropped_events(), 1);

        let order: Vec<ChannelEvent> = vec![
            handle.next_event().await.unwrap(),
            handle.next_event().await.unwrap(),
            handle.next_event().await.unwrap(),
        ];
        assert!(matches!(order[0], ChannelEvent::ReactionAdded { message_id: 10, .. }));
        assert!(matches!(order[1], ChannelEvent::TypingStart { user_id: 2, .. }));
        assert!(matches!(order[2], ChannelEvent::ReactionAdded { message_id: 11, .. }));
    }

    #[tokio::test]
    async fn full_queue_of_critical_events_rejects_the_newcomer() {
        let handle = ConnectionHandle::new(2);
        assert!(handle.enqueue(reaction(1)));
        assert!(handle.enqueue(reaction(2)));

        assert!(!handle.enqueue(reaction(3)));
        assert_eq!(handle.dropped_events(), 1);

        // The queued criticals are intact.
        assert!(matches!(
            handle.next_event().await.unwrap(),
            ChannelEvent::ReactionAdded { message_id: 1, .. }
        ));
    }

    #[tokio::test]
    async fn close_wakes_the_drain_task() {
        let handle = ConnectionHandle::new(4);
        let drain = handle.clone();
        let task = tokio::spawn(async move { drain.next_event().await });

        tokio::task::yield_now().await;
        handle.close();
        assert!(task.await.unwrap().is_none());

        assert!(!handle.enqueue(typing(1)), "closed handles reject events");
    }
}
