use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    Attachment, CaseSeverity, CaseStatus, ComplianceKind, Message, MessageType, UserSummary,
};

// -- JWT Claims --

/// Claims minted by the external identity collaborator. Verified by the REST
/// middleware and at the WebSocket upgrade; this subsystem performs no
/// credential checks of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub email: String,
    pub role: crate::models::DirectoryRole,
    pub exp: usize,
}

impl Claims {
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.sub,
            display_name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

// -- Response envelope --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    /// True iff the page came back full, i.e. length == limit.
    pub has_more: bool,
}

/// Success envelope: `{success: true, data, pagination?}`.
#[derive(Debug, Serialize)]
pub struct ApiData<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T> ApiData<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            pagination: None,
        }
    }

    pub fn paginated(data: T, page: u32, limit: u32, has_more: bool) -> Self {
        Self {
            success: true,
            data,
            pagination: Some(Pagination {
                page,
                limit,
                has_more,
            }),
        }
    }
}

// -- Channels --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateChannelRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub channel_type: Option<crate::models::ChannelType>,
    #[serde(default)]
    pub is_private: bool,
    pub max_members: Option<i64>,
}

/// Archive / read-only toggles; omitted fields stay as they are.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateChannelRequest {
    pub is_archived: Option<bool>,
    pub is_read_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub user_id: i64,
    #[serde(default)]
    pub role: Option<crate::models::MemberRole>,
}

// -- Messages --

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttachmentUpload {
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
    pub reply_to_id: Option<i64>,
    pub thread_root_id: Option<i64>,
    #[serde(default)]
    pub attachments: Vec<AttachmentUpload>,
}

/// A message plus its attachments, as returned by the paging and search
/// endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddReactionRequest {
    pub kind: String,
}

#[derive(Debug, Serialize)]
pub struct AddReactionResponse {
    /// False when the (message, user, kind) triple already existed.
    pub added: bool,
}

#[derive(Debug, Serialize)]
pub struct ReadReceiptResponse {
    /// False when a receipt already existed; the original read_at stands.
    pub recorded: bool,
}

// -- Search & analytics --

#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub query: Option<String>,
    pub channel_id: Option<i64>,
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAnalytics {
    pub channel_id: i64,
    pub window_days: u32,
    pub total_messages: i64,
    pub distinct_senders: i64,
    /// Messages per day over the window, rounded to 2 decimals.
    pub messages_per_day: f64,
    pub flagged_count: i64,
    /// Hour-of-day (0-23) with the most messages; lowest hour wins ties.
    pub peak_hour: Option<u32>,
}

// -- Moderation --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagMessageRequest {
    pub reason: String,
    pub severity: CaseSeverity,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReviewCaseRequest {
    pub status: CaseStatus,
    pub action_notes: Option<String>,
}

// -- Compliance --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplianceSubmitRequest {
    pub request_type: ComplianceKind,
}

// -- Health --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unavailable,
}

/// `{status: healthy|unavailable, tablesExist: bool}` — the degraded-mode
/// surface for the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub tables_exist: bool,
}
