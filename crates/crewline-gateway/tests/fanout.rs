use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crewline_db::{DurableStore, MemoryStore, NewChannel, Store};
use crewline_gateway::{Broadcaster, ConnectionHandle, ConnectionRegistry, OUTBOUND_QUEUE_CAPACITY};
use crewline_types::events::ChannelEvent;
use crewline_types::models::{ChannelType, MemberRole};

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_756_000_000 + secs, 0).single().unwrap()
}

/// Channel with owner 21 and member 22. User 25 exists only as a connection.
fn seed_channel(store: &dyn Store) -> i64 {
    let channel = store
        .create_channel(&NewChannel {
            name: "general".into(),
            description: None,
            channel_type: ChannelType::General,
            is_private: false,
            max_members: None,
            created_by: 21,
            created_at: ts(0),
        })
        .unwrap();
    store
        .add_member(channel.id, 21, MemberRole::Owner, ts(0))
        .unwrap();
    store
        .add_member(channel.id, 22, MemberRole::Member, ts(1))
        .unwrap();
    channel.id
}

async fn register(registry: &ConnectionRegistry, user_id: i64) -> ConnectionHandle {
    let handle = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);
    assert!(registry.register(user_id, handle.clone()).await.is_none());
    handle
}

/// Close the handle and collect whatever was queued on it.
async fn drain(handle: &ConnectionHandle) -> Vec<ChannelEvent> {
    handle.close();
    let mut events = Vec::new();
    while let Some(event) = handle.next_event().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn channel_events_reach_active_members_but_not_the_sender() {
    let store: Arc<dyn Store> = Arc::new(DurableStore::open_in_memory().unwrap());
    let channel_id = seed_channel(store.as_ref());

    let registry = ConnectionRegistry::new();
    let owner = register(&registry, 21).await;
    let sender = register(&registry, 22).await;
    let outsider = register(&registry, 25).await;

    let broadcaster = Broadcaster::new(registry, store);
    broadcaster
        .publish(
            channel_id,
            ChannelEvent::TypingStart {
                channel_id,
                user_id: 22,
            },
            Some(22),
        )
        .await;

    let delivered = drain(&owner).await;
    assert_eq!(delivered.len(), 1);
    assert!(matches!(
        delivered[0],
        ChannelEvent::TypingStart { user_id: 22, .. }
    ));

    assert!(drain(&sender).await.is_empty(), "sender got its own event");
    assert!(drain(&outsider).await.is_empty(), "non-member got the event");
}

#[tokio::test]
async fn former_members_stop_receiving_channel_events() {
    let store: Arc<dyn Store> = Arc::new(DurableStore::open_in_memory().unwrap());
    let channel_id = seed_channel(store.as_ref());
    store.remove_member(channel_id, 22).unwrap();

    let registry = ConnectionRegistry::new();
    let former = register(&registry, 22).await;

    let broadcaster = Broadcaster::new(registry, store);
    broadcaster
        .publish(
            channel_id,
            ChannelEvent::TypingStart {
                channel_id,
                user_id: 21,
            },
            Some(21),
        )
        .await;

    assert!(drain(&former).await.is_empty());
}

#[tokio::test]
async fn degraded_store_falls_back_to_all_connections() {
    // MemoryStore reports unhealthy, so membership is never consulted.
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let channel_id = seed_channel(store.as_ref());

    let registry = ConnectionRegistry::new();
    let owner = register(&registry, 21).await;
    let outsider = register(&registry, 25).await;

    let broadcaster = Broadcaster::new(registry, store);
    broadcaster
        .publish(
            channel_id,
            ChannelEvent::TypingStart {
                channel_id,
                user_id: 22,
            },
            Some(22),
        )
        .await;

    assert_eq!(drain(&owner).await.len(), 1);
    assert_eq!(
        drain(&outsider).await.len(),
        1,
        "degraded fan-out must reach every registered connection"
    );
}

#[tokio::test]
async fn presence_goes_to_everyone_except_the_subject() {
    let store: Arc<dyn Store> = Arc::new(DurableStore::open_in_memory().unwrap());

    let registry = ConnectionRegistry::new();
    let a = register(&registry, 21).await;
    let b = register(&registry, 22).await;

    let broadcaster = Broadcaster::new(registry, store);
    broadcaster
        .publish_all(
            ChannelEvent::PresenceChanged {
                user_id: 22,
                online: true,
            },
            Some(22),
        )
        .await;

    assert_eq!(drain(&a).await.len(), 1);
    assert!(drain(&b).await.is_empty());
}
