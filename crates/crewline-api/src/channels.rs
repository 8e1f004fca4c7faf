use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crewline_db::{NewAudit, NewChannel};
use crewline_types::api::{
    AddMemberRequest, ApiData, Claims, CreateChannelRequest, UpdateChannelRequest,
};
use crewline_types::models::{ChannelType, MemberRole};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

/// Channels where the caller holds an active membership.
pub async fn list_channels(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let channels = blocking(&state, move |store| {
        Ok(store.channels_for_user(user_id)?)
    })
    .await?;
    Ok(Json(ApiData::new(channels)))
}

/// Create a channel; the creator becomes its first (and so far only) owner.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = req.name.trim().to_owned();
    if name.is_empty() {
        return Err(ApiError::Validation("channel name must not be empty".into()));
    }
    if let Some(max) = req.max_members {
        if max < 1 {
            return Err(ApiError::Validation("max_members must be positive".into()));
        }
    }

    let creator = claims.sub;
    let channel = blocking(&state, move |store| {
        let now = Utc::now();
        let channel = store.create_channel(&NewChannel {
            name,
            description: req.description,
            channel_type: req.channel_type.unwrap_or(ChannelType::General),
            is_private: req.is_private,
            max_members: req.max_members,
            created_by: creator,
            created_at: now,
        })?;
        store.add_member(channel.id, creator, MemberRole::Owner, now)?;
        store.record_audit(&NewAudit {
            action: "channel_created".into(),
            actor_id: creator,
            channel_id: Some(channel.id),
            message_id: None,
            payload: json!({ "name": &channel.name, "type": channel.channel_type }),
            created_at: now,
        })?;
        Ok(channel)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiData::new(channel))))
}

/// Archive a channel or toggle read-only. Restricted to the channel's
/// creator and privileged directory roles.
pub async fn update_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UpdateChannelRequest>,
) -> ApiResult<impl IntoResponse> {
    let actor = claims.sub;
    let privileged = claims.role.is_privileged();

    let channel = blocking(&state, move |store| {
        let channel = store.channel(channel_id)?;
        if channel.created_by != actor && !privileged {
            return Err(ApiError::Authorization(
                "cannot update this channel".into(),
            ));
        }
        let now = Utc::now();
        let updated =
            store.set_channel_flags(channel_id, req.is_archived, req.is_read_only, now)?;
        store.record_audit(&NewAudit {
            action: "channel_updated".into(),
            actor_id: actor,
            channel_id: Some(channel_id),
            message_id: None,
            payload: json!({
                "is_archived": updated.is_archived,
                "is_read_only": updated.is_read_only,
            }),
            created_at: now,
        })?;
        Ok(updated)
    })
    .await?;

    Ok(Json(ApiData::new(channel)))
}

/// Add (or reactivate) a member. Open to existing active members and to
/// privileged directory roles; capacity and reactivation rules live in the
/// store.
pub async fn add_member(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.user_id <= 0 {
        return Err(ApiError::Validation("user_id must be positive".into()));
    }

    let actor = claims.sub;
    let privileged = claims.role.is_privileged();
    let membership = blocking(&state, move |store| {
        if !privileged && !store.is_active_member(channel_id, actor)? {
            return Err(ApiError::Authorization(
                "not a member of this channel".into(),
            ));
        }
        let membership = store.add_member(
            channel_id,
            req.user_id,
            req.role.unwrap_or(MemberRole::Member),
            Utc::now(),
        )?;
        Ok(membership)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiData::new(membership))))
}

#[derive(Debug, Deserialize)]
pub struct RemoveMemberQuery {
    /// Defaults to the caller (leaving the channel).
    pub user_id: Option<i64>,
}

/// Deactivate a membership. Members may remove themselves; removing someone
/// else takes a privileged directory role. The last-active-owner guard is
/// enforced by the store.
pub async fn remove_member(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Query(query): Query<RemoveMemberQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let target = query.user_id.unwrap_or(claims.sub);
    if target != claims.sub && !claims.role.is_privileged() {
        return Err(ApiError::Authorization(
            "cannot remove another user's membership".into(),
        ));
    }

    blocking(&state, move |store| {
        store.remove_member(channel_id, target)?;
        Ok(())
    })
    .await?;

    Ok(StatusCode::NO_CONTENT)
}
