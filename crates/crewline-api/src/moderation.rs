use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crewline_db::{NewAudit, NewCase};
use crewline_types::api::{ApiData, Claims, FlagMessageRequest, ReviewCaseRequest};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

/// Flag a message: opens a pending moderation case and marks the message's
/// flagged fields in one store transaction. Any active member of the
/// message's channel can flag.
pub async fn flag_message(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<FlagMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let reason = req.reason.trim().to_owned();
    if reason.is_empty() {
        return Err(ApiError::Validation("flag reason must not be empty".into()));
    }

    let actor = claims.sub;
    let case = blocking(&state, move |store| {
        let message = store.message(message_id)?;
        if !store.is_active_member(message.channel_id, actor)? {
            return Err(ApiError::Authorization(
                "not an active member of this channel".into(),
            ));
        }

        let now = Utc::now();
        let case = store.create_case(&NewCase {
            message_id,
            flagged_by: actor,
            reason,
            severity: req.severity,
            created_at: now,
        })?;
        store.record_audit(&NewAudit {
            action: "message_flagged".into(),
            actor_id: actor,
            channel_id: Some(message.channel_id),
            message_id: Some(message_id),
            payload: json!({ "case_id": case.id, "severity": case.severity }),
            created_at: now,
        })?;
        Ok(case)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiData::new(case))))
}

/// The moderator queue: pending cases only, oldest first. Privileged
/// directory roles only.
pub async fn list_cases(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_privileged(&claims)?;
    let cases = blocking(&state, move |store| Ok(store.pending_cases()?)).await?;
    Ok(Json(ApiData::new(cases)))
}

/// Advance a case along pending -> reviewed -> {resolved | dismissed}. Any
/// other transition is rejected by the store.
pub async fn review_case(
    State(state): State<AppState>,
    Path(case_id): Path<i64>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ReviewCaseRequest>,
) -> ApiResult<impl IntoResponse> {
    require_privileged(&claims)?;

    let reviewer = claims.sub;
    let case = blocking(&state, move |store| {
        let now = Utc::now();
        let case = store.transition_case(
            case_id,
            req.status,
            reviewer,
            req.action_notes.as_deref(),
            now,
        )?;
        store.record_audit(&NewAudit {
            action: "case_reviewed".into(),
            actor_id: reviewer,
            channel_id: None,
            message_id: Some(case.message_id),
            payload: json!({ "case_id": case.id, "status": case.status }),
            created_at: now,
        })?;
        Ok(case)
    })
    .await?;

    Ok(Json(ApiData::new(case)))
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    pub limit: u32,
}

fn default_audit_limit() -> u32 {
    100
}

/// Most recent audit records, newest first. Privileged roles only.
pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    require_privileged(&claims)?;
    let limit = query.limit.clamp(1, 500);
    let records = blocking(&state, move |store| Ok(store.recent_audit(limit)?)).await?;
    Ok(Json(ApiData::new(records)))
}

fn require_privileged(claims: &Claims) -> ApiResult<()> {
    if claims.role.is_privileged() {
        Ok(())
    } else {
        Err(ApiError::Authorization(
            "moderation requires an admin or hr role".into(),
        ))
    }
}
