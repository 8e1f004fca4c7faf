use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use tracing::warn;

use crewline_types::models::{
    Attachment, AuditRecord, CaseSeverity, CaseStatus, Channel, ChannelType, ComplianceKind,
    ComplianceRequest, ComplianceStatus, MemberRole, Membership, Message, MessageType,
    ModerationCase,
};

/// Parameters for a channel insert. Flags beyond `is_private` start false.
#[derive(Debug, Clone)]
pub struct NewChannel {
    pub name: String,
    pub description: Option<String>,
    pub channel_type: ChannelType,
    pub is_private: bool,
    pub max_members: Option<i64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub channel_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub reply_to_id: Option<i64>,
    pub thread_root_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCase {
    pub message_id: i64,
    pub flagged_by: i64,
    pub reason: String,
    pub severity: CaseSeverity,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAudit {
    pub action: String,
    pub actor_id: i64,
    pub channel_id: Option<i64>,
    pub message_id: Option<i64>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// -- Timestamp encoding --
//
// Fixed-width RFC 3339 with microseconds and a Z suffix, so lexicographic
// order in SQL equals chronological order and string MAX() is a valid
// monotonic bump.

pub(crate) fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>().unwrap_or_else(|e| {
        warn!("Corrupt timestamp '{}': {}", raw, e);
        DateTime::default()
    })
}

pub(crate) fn parse_opt_ts(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref().map(parse_ts)
}

// -- Row mapping --

pub(crate) fn channel_from_row(row: &Row) -> rusqlite::Result<Channel> {
    let channel_type: String = row.get("channel_type")?;
    let settings_raw: String = row.get("settings")?;
    let settings = serde_json::from_str(&settings_raw).unwrap_or_else(|e| {
        warn!("Corrupt channel settings '{}': {}", settings_raw, e);
        Default::default()
    });

    Ok(Channel {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        channel_type: ChannelType::parse(&channel_type).unwrap_or(ChannelType::General),
        is_private: row.get("is_private")?,
        is_archived: row.get("is_archived")?,
        is_read_only: row.get("is_read_only")?,
        max_members: row.get("max_members")?,
        created_by: row.get("created_by")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
        last_activity_at: parse_ts(&row.get::<_, String>("last_activity_at")?),
        settings,
    })
}

pub(crate) fn membership_from_row(row: &Row) -> rusqlite::Result<Membership> {
    let role: String = row.get("role")?;
    Ok(Membership {
        channel_id: row.get("channel_id")?,
        user_id: row.get("user_id")?,
        role: MemberRole::parse(&role).unwrap_or(MemberRole::Member),
        joined_at: parse_ts(&row.get::<_, String>("joined_at")?),
        is_active: row.get("is_active")?,
    })
}

pub(crate) fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    let message_type: String = row.get("message_type")?;
    Ok(Message {
        id: row.get("id")?,
        channel_id: row.get("channel_id")?,
        sender_id: row.get("sender_id")?,
        content: row.get("content")?,
        message_type: MessageType::parse(&message_type).unwrap_or(MessageType::Text),
        reply_to_id: row.get("reply_to_id")?,
        thread_root_id: row.get("thread_root_id")?,
        is_edited: row.get("is_edited")?,
        is_deleted: row.get("is_deleted")?,
        is_pinned: row.get("is_pinned")?,
        is_flagged: row.get("is_flagged")?,
        flag_reason: row.get("flag_reason")?,
        flagged_by: row.get("flagged_by")?,
        flagged_at: parse_opt_ts(row.get("flagged_at")?),
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
}

pub(crate) fn attachment_from_row(row: &Row) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get("id")?,
        message_id: row.get("message_id")?,
        file_name: row.get("file_name")?,
        file_type: row.get("file_type")?,
        file_size: row.get("file_size")?,
        url: row.get("url")?,
        thumbnail_url: row.get("thumbnail_url")?,
        mime_type: row.get("mime_type")?,
    })
}

pub(crate) fn case_from_row(row: &Row) -> rusqlite::Result<ModerationCase> {
    let severity: String = row.get("severity")?;
    let status: String = row.get("status")?;
    Ok(ModerationCase {
        id: row.get("id")?,
        message_id: row.get("message_id")?,
        flagged_by: row.get("flagged_by")?,
        reason: row.get("reason")?,
        severity: CaseSeverity::parse(&severity).unwrap_or(CaseSeverity::Low),
        status: CaseStatus::parse(&status).unwrap_or(CaseStatus::Pending),
        reviewed_by: row.get("reviewed_by")?,
        action_notes: row.get("action_notes")?,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
        updated_at: parse_ts(&row.get::<_, String>("updated_at")?),
    })
}

pub(crate) fn compliance_from_row(row: &Row) -> rusqlite::Result<ComplianceRequest> {
    let kind: String = row.get("kind")?;
    let status: String = row.get("status")?;
    Ok(ComplianceRequest {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        kind: ComplianceKind::parse(&kind).unwrap_or(ComplianceKind::Export),
        status: ComplianceStatus::parse(&status).unwrap_or(ComplianceStatus::Pending),
        requested_payload: parse_opt_json(row.get("requested_payload")?),
        processed_payload: parse_opt_json(row.get("processed_payload")?),
        completed_at: parse_opt_ts(row.get("completed_at")?),
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

pub(crate) fn audit_from_row(row: &Row) -> rusqlite::Result<AuditRecord> {
    let payload_raw: String = row.get("payload")?;
    let payload = serde_json::from_str(&payload_raw).unwrap_or_else(|e| {
        warn!("Corrupt audit payload '{}': {}", payload_raw, e);
        serde_json::Value::Null
    });
    Ok(AuditRecord {
        id: row.get("id")?,
        action: row.get("action")?,
        actor_id: row.get("actor_id")?,
        channel_id: row.get("channel_id")?,
        message_id: row.get("message_id")?,
        payload,
        created_at: parse_ts(&row.get::<_, String>("created_at")?),
    })
}

fn parse_opt_json(raw: Option<String>) -> Option<serde_json::Value> {
    raw.as_deref().and_then(|s| {
        serde_json::from_str(s)
            .map_err(|e| warn!("Corrupt JSON payload '{}': {}", s, e))
            .ok()
    })
}
