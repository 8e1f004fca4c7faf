use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Denormalized identity attached to requests and broadcast events so
/// subscribers never need a follow-up directory lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub role: DirectoryRole,
}

/// Role assigned by the external user directory. Channel-level roles live in
/// `MemberRole`; this one gates moderation and compliance surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryRole {
    Employee,
    Manager,
    Hr,
    Admin,
}

impl DirectoryRole {
    /// Moderation queue and case mutations are limited to admin/hr.
    pub fn is_privileged(&self) -> bool {
        matches!(self, DirectoryRole::Hr | DirectoryRole::Admin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DirectoryRole::Employee => "employee",
            DirectoryRole::Manager => "manager",
            DirectoryRole::Hr => "hr",
            DirectoryRole::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    General,
    Project,
    Department,
    Private,
    Announcement,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::General => "general",
            ChannelType::Project => "project",
            ChannelType::Department => "department",
            ChannelType::Private => "private",
            ChannelType::Announcement => "announcement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "general" => Some(ChannelType::General),
            "project" => Some(ChannelType::Project),
            "department" => Some(ChannelType::Department),
            "private" => Some(ChannelType::Private),
            "announcement" => Some(ChannelType::Announcement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub channel_type: ChannelType,
    pub is_private: bool,
    pub is_archived: bool,
    pub is_read_only: bool,
    pub max_members: Option<i64>,
    pub created_by: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonically non-decreasing; bumped by every accepted message.
    pub last_activity_at: DateTime<Utc>,
    pub settings: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Admin,
    Moderator,
    Member,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Owner => "owner",
            MemberRole::Admin => "admin",
            MemberRole::Moderator => "moderator",
            MemberRole::Member => "member",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MemberRole::Owner),
            "admin" => Some(MemberRole::Admin),
            "moderator" => Some(MemberRole::Moderator),
            "member" => Some(MemberRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub channel_id: i64,
    pub user_id: i64,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    /// Removal flips this to false; the row is kept for auditable history.
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
    System,
    Announcement,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::File => "file",
            MessageType::System => "system",
            MessageType::Announcement => "announcement",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(MessageType::Text),
            "image" => Some(MessageType::Image),
            "file" => Some(MessageType::File),
            "system" => Some(MessageType::System),
            "announcement" => Some(MessageType::Announcement),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub channel_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    /// Must reference a message in the same channel.
    pub reply_to_id: Option<i64>,
    /// Must reference a message in the same channel.
    pub thread_root_id: Option<i64>,
    pub is_edited: bool,
    /// Deleted messages are never physically removed, so reply chains
    /// stay resolvable.
    pub is_deleted: bool,
    pub is_pinned: bool,
    pub is_flagged: bool,
    pub flag_reason: Option<String>,
    pub flagged_by: Option<i64>,
    pub flagged_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub message_id: i64,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    /// Stable URL returned by the external file-storage collaborator.
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reaction {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReceipt {
    pub message_id: i64,
    pub user_id: i64,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl CaseSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseSeverity::Low => "low",
            CaseSeverity::Medium => "medium",
            CaseSeverity::High => "high",
            CaseSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(CaseSeverity::Low),
            "medium" => Some(CaseSeverity::Medium),
            "high" => Some(CaseSeverity::High),
            "critical" => Some(CaseSeverity::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pending,
    Reviewed,
    Resolved,
    Dismissed,
}

impl CaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Pending => "pending",
            CaseStatus::Reviewed => "reviewed",
            CaseStatus::Resolved => "resolved",
            CaseStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CaseStatus::Pending),
            "reviewed" => Some(CaseStatus::Reviewed),
            "resolved" => Some(CaseStatus::Resolved),
            "dismissed" => Some(CaseStatus::Dismissed),
            _ => None,
        }
    }

    /// The review state machine: pending -> reviewed -> {resolved | dismissed}.
    pub fn can_transition_to(&self, next: CaseStatus) -> bool {
        matches!(
            (self, next),
            (CaseStatus::Pending, CaseStatus::Reviewed)
                | (CaseStatus::Reviewed, CaseStatus::Resolved)
                | (CaseStatus::Reviewed, CaseStatus::Dismissed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationCase {
    pub id: i64,
    pub message_id: i64,
    pub flagged_by: i64,
    pub reason: String,
    pub severity: CaseSeverity,
    pub status: CaseStatus,
    pub reviewed_by: Option<i64>,
    pub action_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceKind {
    Export,
    Deletion,
    Correction,
}

impl ComplianceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceKind::Export => "export",
            ComplianceKind::Deletion => "deletion",
            ComplianceKind::Correction => "correction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "export" => Some(ComplianceKind::Export),
            "deletion" => Some(ComplianceKind::Deletion),
            "correction" => Some(ComplianceKind::Correction),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ComplianceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplianceStatus::Pending => "pending",
            ComplianceStatus::Processing => "processing",
            ComplianceStatus::Completed => "completed",
            ComplianceStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ComplianceStatus::Pending),
            "processing" => Some(ComplianceStatus::Processing),
            "completed" => Some(ComplianceStatus::Completed),
            "failed" => Some(ComplianceStatus::Failed),
            _ => None,
        }
    }

    /// pending -> processing -> {completed | failed}
    pub fn can_transition_to(&self, next: ComplianceStatus) -> bool {
        matches!(
            (self, next),
            (ComplianceStatus::Pending, ComplianceStatus::Processing)
                | (ComplianceStatus::Processing, ComplianceStatus::Completed)
                | (ComplianceStatus::Processing, ComplianceStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceRequest {
    pub id: i64,
    pub user_id: i64,
    pub kind: ComplianceKind,
    pub status: ComplianceStatus,
    pub requested_payload: Option<serde_json::Value>,
    pub processed_payload: Option<serde_json::Value>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// One row per state-changing pipeline action (message_sent, message_flagged,
/// case_reviewed, ...), with a payload snapshot for later review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub action: String,
    pub actor_id: i64,
    pub channel_id: Option<i64>,
    pub message_id: Option<i64>,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
