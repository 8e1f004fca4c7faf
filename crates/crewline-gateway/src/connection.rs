use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};

use crewline_types::events::{ChannelEvent, ClientCommand};
use crewline_types::models::UserSummary;

use crate::broadcast::Broadcaster;
use crate::registry::{ConnectionHandle, ConnectionRegistry, OUTBOUND_QUEUE_CAPACITY};

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Drive one authenticated WebSocket connection: register it, spawn the two
/// per-connection tasks (inbound frames, outbound queue drain), and clean up
/// on whichever side finishes first. Identity was verified at the HTTP
/// upgrade layer.
pub async fn handle_connection(
    socket: WebSocket,
    registry: ConnectionRegistry,
    broadcaster: Broadcaster,
    identity: UserSummary,
) {
    let user_id = identity.id;
    let (mut sender, mut receiver) = socket.split();

    let handle = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);
    let conn_id = handle.conn_id();

    // Single-session-per-user: closing the replaced handle stops its writer.
    if let Some(previous) = registry.register(user_id, handle.clone()).await {
        previous.close();
    }

    info!("{} ({}) connected", identity.display_name, user_id);

    broadcaster
        .publish_all(
            ChannelEvent::PresenceChanged {
                user_id,
                online: true,
            },
            Some(user_id),
        )
        .await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received;

    // Writer task: drains the bounded outbound queue, with heartbeat.
    let drain_handle = handle.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = drain_handle.next_event() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(user_id, error = %e, "failed to serialize event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(user_id, "heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Reader task: ephemeral relay commands only; anything durable goes
    // through the REST API.
    let relay = broadcaster.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = receiver.next().await {
            match frame {
                Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => handle_command(&relay, user_id, command).await,
                    Err(e) => {
                        warn!(
                            user_id,
                            error = %e,
                            raw = text.get(..text.len().min(200)).unwrap_or(""),
                            "bad client command"
                        );
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    handle.close();

    // Presence only changes if this connection still owned the mapping.
    if registry.unregister(user_id, conn_id).await {
        broadcaster
            .publish_all(
                ChannelEvent::PresenceChanged {
                    user_id,
                    online: false,
                },
                Some(user_id),
            )
            .await;
    }

    let dropped = handle.dropped_events();
    if dropped > 0 {
        info!(user_id, dropped, "connection closed with dropped events");
    }
    info!("{} ({}) disconnected", identity.display_name, user_id);
}

/// Typing and read-marker frames are stateless relays: re-published through
/// the broadcast engine tagged with the originating user, never persisted.
async fn handle_command(broadcaster: &Broadcaster, user_id: i64, command: ClientCommand) {
    let (channel_id, event) = match command {
        ClientCommand::TypingStart { channel_id } => (
            channel_id,
            ChannelEvent::TypingStart {
                channel_id,
                user_id,
            },
        ),
        ClientCommand::TypingStop { channel_id } => (
            channel_id,
            ChannelEvent::TypingStop {
                channel_id,
                user_id,
            },
        ),
        ClientCommand::MessageRead {
            channel_id,
            message_id,
        } => (
            channel_id,
            ChannelEvent::MessageRead {
                channel_id,
                user_id,
                message_id,
            },
        ),
    };
    broadcaster.publish(channel_id, event, Some(user_id)).await;
}
