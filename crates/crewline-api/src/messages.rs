use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crewline_db::{NewAudit, NewMessage, Store};
use crewline_types::api::{
    AddReactionRequest, AddReactionResponse, ApiData, Claims, MessageView, ReadReceiptResponse,
    SendMessageRequest,
};
use crewline_types::events::ChannelEvent;
use crewline_types::models::{Attachment, Message, MessageType};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

pub const MAX_CONTENT_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    /// Exclusive created-at cursor: return only messages older than this.
    pub before: Option<DateTime<Utc>>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

/// Page/limit to a row offset. Saturating: an absurd page number yields the
/// last addressable offset instead of overflowing.
pub(crate) fn page_offset(page: u32, limit: u32) -> u32 {
    page.saturating_sub(1).saturating_mul(limit)
}

/// The ingestion pipeline. Ordered: verified identity, active membership,
/// content validation, persist (+attachments), activity bump, audit record,
/// broadcast. A failure anywhere before the broadcast aborts the send; the
/// broadcast itself never fails the sender — their HTTP response is their
/// echo.
pub async fn send_message(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if claims.sub <= 0 {
        return Err(ApiError::Validation("invalid sender id".into()));
    }

    let content = req.content.trim().to_owned();
    if content.is_empty() {
        return Err(ApiError::Validation("message content must not be empty".into()));
    }
    if content.chars().count() > MAX_CONTENT_CHARS {
        return Err(ApiError::Validation(format!(
            "message content exceeds {MAX_CONTENT_CHARS} characters"
        )));
    }

    let sender_id = claims.sub;
    let (message, attachments) = blocking(&state, move |store| {
        persist_message(store, channel_id, sender_id, content, &req)
    })
    .await?;

    let view = MessageView {
        message: message.clone(),
        attachments,
    };

    // Step 6: fan out to the channel's live members except the sender.
    state
        .broadcaster
        .publish(
            channel_id,
            ChannelEvent::MessageSent {
                message,
                sender: claims.summary(),
            },
            Some(sender_id),
        )
        .await;

    Ok((StatusCode::CREATED, Json(ApiData::new(view))))
}

/// Steps 2-5 of the pipeline, on the blocking thread so membership check,
/// insert, activity bump and audit land on one store pass.
fn persist_message(
    store: &dyn Store,
    channel_id: i64,
    sender_id: i64,
    content: String,
    req: &SendMessageRequest,
) -> ApiResult<(Message, Vec<Attachment>)> {
    if !store.is_active_member(channel_id, sender_id)? {
        return Err(ApiError::Authorization(
            "not an active member of this channel".into(),
        ));
    }

    let channel = store.channel(channel_id)?;
    if channel.is_archived {
        return Err(ApiError::Validation("channel is archived".into()));
    }
    if channel.is_read_only {
        return Err(ApiError::Validation("channel is read-only".into()));
    }

    // Reply/thread references must resolve within the same channel.
    for reference in [req.reply_to_id, req.thread_root_id].into_iter().flatten() {
        let referenced = store.message(reference)?;
        if referenced.channel_id != channel_id {
            return Err(ApiError::Validation(
                "referenced message belongs to another channel".into(),
            ));
        }
    }

    let now = Utc::now();
    let message = store.insert_message(&NewMessage {
        channel_id,
        sender_id,
        content,
        message_type: req.message_type.unwrap_or(MessageType::Text),
        reply_to_id: req.reply_to_id,
        thread_root_id: req.thread_root_id,
        created_at: now,
    })?;

    let mut attachments = Vec::with_capacity(req.attachments.len());
    for upload in &req.attachments {
        attachments.push(store.insert_attachment(message.id, upload)?);
    }

    store.touch_channel(channel_id, now)?;

    store.record_audit(&NewAudit {
        action: "message_sent".into(),
        actor_id: sender_id,
        channel_id: Some(channel_id),
        message_id: Some(message.id),
        payload: json!({
            "message_type": message.message_type,
            "content_chars": message.content.chars().count(),
            "attachments": attachments.len(),
        }),
        created_at: now,
    })?;

    Ok((message, attachments))
}

/// Newest-first page of a channel's messages, attachments included.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Query(query): Query<PageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 200);
    let offset = page_offset(page, limit);
    let before = query.before;

    let user_id = claims.sub;
    let views = blocking(&state, move |store| {
        if !store.is_active_member(channel_id, user_id)? {
            return Err(ApiError::Authorization(
                "not an active member of this channel".into(),
            ));
        }
        let messages = store.messages_page(channel_id, limit, offset, before)?;
        attach(store, messages)
    })
    .await?;

    let has_more = views.len() as u32 == limit;
    Ok(Json(ApiData::paginated(views, page, limit, has_more)))
}

/// Join messages with their attachments in one query.
pub(crate) fn attach(store: &dyn Store, messages: Vec<Message>) -> ApiResult<Vec<MessageView>> {
    let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
    let mut by_message: HashMap<i64, Vec<Attachment>> = HashMap::new();
    for attachment in store.attachments_for_messages(&ids)? {
        by_message
            .entry(attachment.message_id)
            .or_default()
            .push(attachment);
    }
    Ok(messages
        .into_iter()
        .map(|message| {
            let attachments = by_message.remove(&message.id).unwrap_or_default();
            MessageView {
                message,
                attachments,
            }
        })
        .collect())
}

/// Soft delete: the row survives so reply chains stay resolvable. The sender
/// may delete their own message; privileged roles may delete any.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.sub;
    let privileged = claims.role.is_privileged();

    blocking(&state, move |store| {
        let message = store.message(message_id)?;
        if message.sender_id != actor && !privileged {
            return Err(ApiError::Authorization(
                "cannot delete another user's message".into(),
            ));
        }
        let now = Utc::now();
        store.soft_delete_message(message_id, now)?;
        store.record_audit(&NewAudit {
            action: "message_deleted".into(),
            actor_id: actor,
            channel_id: Some(message.channel_id),
            message_id: Some(message_id),
            payload: json!({ "sender_id": message.sender_id }),
            created_at: now,
        })?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Add a reaction. The (message, user, kind) triple is unique; a duplicate
/// is a no-op reported as `added: false`, and only a first-time add is
/// broadcast.
pub async fn add_reaction(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddReactionRequest>,
) -> ApiResult<impl IntoResponse> {
    let kind = req.kind.trim().to_owned();
    if kind.is_empty() {
        return Err(ApiError::Validation("reaction kind must not be empty".into()));
    }

    let user_id = claims.sub;
    let reaction_kind = kind.clone();
    let (channel_id, added) = blocking(&state, move |store| {
        let message = store.message(message_id)?;
        if !store.is_active_member(message.channel_id, user_id)? {
            return Err(ApiError::Authorization(
                "not an active member of this channel".into(),
            ));
        }
        let added = store.add_reaction(message_id, user_id, &reaction_kind, Utc::now())?;
        Ok((message.channel_id, added))
    })
    .await?;

    if added {
        state
            .broadcaster
            .publish(
                channel_id,
                ChannelEvent::ReactionAdded {
                    channel_id,
                    message_id,
                    user_id,
                    kind,
                },
                Some(user_id),
            )
            .await;
    }

    Ok(Json(ApiData::new(AddReactionResponse { added })))
}

/// The durable read-receipt path. First insert wins; repeats are no-ops.
/// (The WebSocket `message_read` frame is the ephemeral relay and never
/// lands here.)
pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let recorded = blocking(&state, move |store| {
        let message = store.message(message_id)?;
        if !store.is_active_member(message.channel_id, user_id)? {
            return Err(ApiError::Authorization(
                "not an active member of this channel".into(),
            ));
        }
        Ok(store.insert_read_receipt(message_id, user_id, Utc::now())?)
    })
    .await?;

    Ok(Json(ApiData::new(ReadReceiptResponse { recorded })))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};

    use crewline_db::{DurableStore, NewChannel, Store};
    use crewline_gateway::{
        Broadcaster, ConnectionHandle, ConnectionRegistry, OUTBOUND_QUEUE_CAPACITY,
    };
    use crewline_types::models::{ChannelType, MemberRole};

    use super::*;

    fn request(content: &str) -> SendMessageRequest {
        SendMessageRequest {
            content: content.into(),
            message_type: None,
            reply_to_id: None,
            thread_root_id: None,
            attachments: vec![],
        }
    }

    /// Channel "general" with owner 21 and member 22.
    fn seed(store: &dyn Store) -> i64 {
        let at = Utc.timestamp_opt(1_756_000_000, 0).single().unwrap();
        let channel = store
            .create_channel(&NewChannel {
                name: "general".into(),
                description: None,
                channel_type: ChannelType::General,
                is_private: false,
                max_members: None,
                created_by: 21,
                created_at: at,
            })
            .unwrap();
        store.add_member(channel.id, 21, MemberRole::Owner, at).unwrap();
        store.add_member(channel.id, 22, MemberRole::Member, at).unwrap();
        channel.id
    }

    #[test]
    fn page_offset_saturates_instead_of_overflowing() {
        assert_eq!(page_offset(1, 50), 0);
        assert_eq!(page_offset(3, 50), 100);
        assert_eq!(page_offset(u32::MAX, 200), u32::MAX);
    }

    #[test]
    fn accepted_message_is_persisted_audited_and_bumps_activity() {
        let store = DurableStore::open_in_memory().unwrap();
        let channel_id = seed(&store);
        let before = store.channel(channel_id).unwrap().last_activity_at;

        let (message, attachments) =
            persist_message(&store, channel_id, 22, "hello".into(), &request("hello")).unwrap();

        assert_eq!(message.channel_id, channel_id);
        assert_eq!(message.sender_id, 22);
        assert!(!message.is_deleted);
        assert!(attachments.is_empty());

        let channel = store.channel(channel_id).unwrap();
        assert!(channel.last_activity_at >= before);

        let audit = store.recent_audit(10).unwrap();
        assert_eq!(audit[0].action, "message_sent");
        assert_eq!(audit[0].actor_id, 22);
        assert_eq!(audit[0].message_id, Some(message.id));
    }

    #[test]
    fn non_members_cannot_send() {
        let store = DurableStore::open_in_memory().unwrap();
        let channel_id = seed(&store);

        let result = persist_message(&store, channel_id, 99, "hi".into(), &request("hi"));
        assert!(matches!(result, Err(ApiError::Authorization(_))));
        assert!(store.recent_audit(10).unwrap().is_empty());
    }

    #[test]
    fn cross_channel_reply_references_are_rejected() {
        let store = DurableStore::open_in_memory().unwrap();
        let general = seed(&store);
        let at = Utc.timestamp_opt(1_756_000_100, 0).single().unwrap();
        let other = store
            .create_channel(&NewChannel {
                name: "random".into(),
                description: None,
                channel_type: ChannelType::General,
                is_private: false,
                max_members: None,
                created_by: 21,
                created_at: at,
            })
            .unwrap();
        store.add_member(other.id, 22, MemberRole::Member, at).unwrap();

        let (foreign, _) =
            persist_message(&store, other.id, 22, "root".into(), &request("root")).unwrap();

        let mut req = request("reply");
        req.reply_to_id = Some(foreign.id);
        let result = persist_message(&store, general, 22, "reply".into(), &req);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn archived_and_read_only_channels_refuse_messages() {
        let store = DurableStore::open_in_memory().unwrap();
        let channel_id = seed(&store);

        let at = Utc.timestamp_opt(1_756_000_200, 0).single().unwrap();
        store
            .set_channel_flags(channel_id, None, Some(true), at)
            .unwrap();
        let result = persist_message(&store, channel_id, 22, "hi".into(), &request("hi"));
        assert!(matches!(result, Err(ApiError::Validation(_))));

        store
            .set_channel_flags(channel_id, Some(true), Some(false), at)
            .unwrap();
        let result = persist_message(&store, channel_id, 22, "hi".into(), &request("hi"));
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[tokio::test]
    async fn sent_messages_reach_the_other_member_only() {
        let store: Arc<dyn Store> = Arc::new(DurableStore::open_in_memory().unwrap());
        let channel_id = seed(store.as_ref());

        let registry = ConnectionRegistry::new();
        let owner_conn = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);
        let sender_conn = ConnectionHandle::new(OUTBOUND_QUEUE_CAPACITY);
        registry.register(21, owner_conn.clone()).await;
        registry.register(22, sender_conn.clone()).await;
        let broadcaster = Broadcaster::new(registry, store.clone());

        let (message, _) =
            persist_message(store.as_ref(), channel_id, 22, "hello".into(), &request("hello"))
                .unwrap();

        broadcaster
            .publish(
                channel_id,
                ChannelEvent::MessageSent {
                    message: message.clone(),
                    sender: crewline_types::models::UserSummary {
                        id: 22,
                        display_name: "Blair".into(),
                        email: "blair@example.com".into(),
                        role: crewline_types::models::DirectoryRole::Employee,
                    },
                },
                Some(22),
            )
            .await;

        owner_conn.close();
        let delivered = owner_conn.next_event().await.unwrap();
        match delivered {
            ChannelEvent::MessageSent { message: m, sender } => {
                assert_eq!(m.id, message.id);
                assert_eq!(sender.id, 22);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        sender_conn.close();
        assert!(sender_conn.next_event().await.is_none(), "sender echoed");
    }
}
