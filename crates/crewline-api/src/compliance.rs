use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::Utc;
use serde_json::json;

use crewline_types::api::{ApiData, Claims, ComplianceSubmitRequest};

use crate::error::{ApiError, ApiResult};
use crate::{AppState, blocking};

/// Submit a data request. The row is returned immediately in `pending`;
/// processing happens out of band and advances the status through the
/// store's state machine.
pub async fn submit_request(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ComplianceSubmitRequest>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let requested = json!({
        "kind": req.request_type,
        "requested_by": user_id,
        "requested_at": Utc::now(),
    });

    let request = blocking(&state, move |store| {
        Ok(store.submit_compliance(user_id, req.request_type, requested, Utc::now())?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(ApiData::new(request))))
}

/// Requesters can read their own request; admin/hr can read any.
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<i64>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let user_id = claims.sub;
    let privileged = claims.role.is_privileged();

    let request = blocking(&state, move |store| {
        let request = store.compliance_request(request_id)?;
        if request.user_id != user_id && !privileged {
            return Err(ApiError::Authorization(
                "cannot read another user's compliance request".into(),
            ));
        }
        Ok(request)
    })
    .await?;

    Ok(Json(ApiData::new(request)))
}
