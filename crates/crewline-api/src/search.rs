use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crewline_types::api::{ApiData, Claims, SearchFilter};

use crate::error::{ApiError, ApiResult};
use crate::messages::{attach, page_offset};
use crate::{AppState, blocking};

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Substring match over message content.
    pub query: Option<String>,
    pub channel_id: Option<i64>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

/// Search the caller's channels. Scope is enforced in the store query:
/// only channels with an active membership, deleted messages excluded,
/// newest first.
pub async fn search_messages(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, 200);

    let filter = SearchFilter {
        query: query.query.filter(|q| !q.trim().is_empty()),
        channel_id: query.channel_id,
        after: query.after,
        before: query.before,
        limit,
        offset: page_offset(page, limit),
    };

    let user_id = claims.sub;
    let views = blocking(&state, move |store| {
        let messages = store.search_messages(user_id, &filter)?;
        attach(store, messages)
    })
    .await?;

    let has_more = views.len() as u32 == limit;
    Ok(Json(ApiData::paginated(views, page, limit, has_more)))
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    30
}

/// Per-channel activity over a trailing window. Open to active members and
/// privileged roles.
pub async fn channel_analytics(
    State(state): State<AppState>,
    Path(channel_id): Path<i64>,
    Query(query): Query<AnalyticsQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let days = query.days.clamp(1, 365);
    let user_id = claims.sub;
    let privileged = claims.role.is_privileged();

    let analytics = blocking(&state, move |store| {
        if !privileged && !store.is_active_member(channel_id, user_id)? {
            return Err(ApiError::Authorization(
                "not an active member of this channel".into(),
            ));
        }
        Ok(store.channel_analytics(channel_id, days, Utc::now())?)
    })
    .await?;

    Ok(Json(ApiData::new(analytics)))
}
