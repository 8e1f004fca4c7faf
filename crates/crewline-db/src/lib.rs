pub mod durable;
pub mod memory;
pub mod migrations;
pub mod models;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crewline_types::api::{AttachmentUpload, ChannelAnalytics, SearchFilter};
use crewline_types::models::{
    Attachment, AuditRecord, CaseStatus, Channel, ComplianceKind, ComplianceRequest,
    ComplianceStatus, MemberRole, Membership, Message, ModerationCase,
};

pub use durable::DurableStore;
pub use memory::MemoryStore;
pub use models::{NewAudit, NewCase, NewChannel, NewMessage};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("durable store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// What the `/health` surface reports. A store is healthy iff it is durable
/// and its schema is present; anything else puts the broadcast engine in
/// degraded (fan-out-to-everyone) mode.
#[derive(Debug, Clone, Copy)]
pub struct StoreHealth {
    pub durable: bool,
    pub tables_exist: bool,
}

impl StoreHealth {
    pub fn is_healthy(&self) -> bool {
        self.durable && self.tables_exist
    }
}

/// The durable-store capability. `DurableStore` (rusqlite) is selected at
/// startup when a database path is configured and opens cleanly;
/// `MemoryStore` otherwise. All timestamps are passed in by the caller so
/// pipelines stay deterministic under test.
pub trait Store: Send + Sync {
    fn health(&self) -> StoreHealth;

    // -- Channels --

    fn create_channel(&self, new: &NewChannel) -> StoreResult<Channel>;
    fn channel(&self, id: i64) -> StoreResult<Channel>;
    fn channels_for_user(&self, user_id: i64) -> StoreResult<Vec<Channel>>;
    /// Bump `last_activity_at`. Monotonic: an older timestamp never moves
    /// the value backwards.
    fn touch_channel(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;
    /// Archive / read-only toggles. `None` leaves a flag unchanged.
    fn set_channel_flags(
        &self,
        id: i64,
        is_archived: Option<bool>,
        is_read_only: Option<bool>,
        at: DateTime<Utc>,
    ) -> StoreResult<Channel>;

    // -- Membership --

    /// Insert or reactivate a membership row.
    fn add_member(
        &self,
        channel_id: i64,
        user_id: i64,
        role: MemberRole,
        at: DateTime<Utc>,
    ) -> StoreResult<Membership>;
    /// Sets is_active=false, keeping the row. Refuses to deactivate the last
    /// active owner while other memberships remain active.
    fn remove_member(&self, channel_id: i64, user_id: i64) -> StoreResult<()>;
    fn is_active_member(&self, channel_id: i64, user_id: i64) -> StoreResult<bool>;
    fn active_member_ids(&self, channel_id: i64) -> StoreResult<Vec<i64>>;

    // -- Messages --

    fn insert_message(&self, new: &NewMessage) -> StoreResult<Message>;
    fn message(&self, id: i64) -> StoreResult<Message>;
    /// Newest-first page; `before` is an exclusive created-at cursor.
    fn messages_page(
        &self,
        channel_id: i64,
        limit: u32,
        offset: u32,
        before: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>>;
    /// Idempotent; the row is never physically removed.
    fn soft_delete_message(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;
    fn insert_attachment(&self, message_id: i64, upload: &AttachmentUpload)
    -> StoreResult<Attachment>;
    fn attachments_for_messages(&self, message_ids: &[i64]) -> StoreResult<Vec<Attachment>>;
    /// Returns false (no-op) when the (message, user, kind) triple exists.
    fn add_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        kind: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;
    /// Returns false (no-op) when a receipt already exists for the pair.
    fn insert_read_receipt(
        &self,
        message_id: i64,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    // -- Audit --

    fn record_audit(&self, new: &NewAudit) -> StoreResult<()>;
    fn recent_audit(&self, limit: u32) -> StoreResult<Vec<AuditRecord>>;

    // -- Moderation --

    /// Creates a pending case and sets the flagged fields on the message.
    fn create_case(&self, new: &NewCase) -> StoreResult<ModerationCase>;
    fn moderation_case(&self, id: i64) -> StoreResult<ModerationCase>;
    /// The default moderator queue: pending cases only, oldest first.
    fn pending_cases(&self) -> StoreResult<Vec<ModerationCase>>;
    /// Strict state machine: pending -> reviewed -> {resolved | dismissed}.
    fn transition_case(
        &self,
        id: i64,
        to: CaseStatus,
        reviewer_id: i64,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<ModerationCase>;

    // -- Search & analytics --

    /// Scoped to channels where `user_id` is an active member. Deleted
    /// messages are excluded. Newest first.
    fn search_messages(&self, user_id: i64, filter: &SearchFilter) -> StoreResult<Vec<Message>>;
    fn channel_analytics(
        &self,
        channel_id: i64,
        days: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<ChannelAnalytics>;

    // -- Compliance --

    fn submit_compliance(
        &self,
        user_id: i64,
        kind: ComplianceKind,
        requested: serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<ComplianceRequest>;
    fn compliance_request(&self, id: i64) -> StoreResult<ComplianceRequest>;
    /// Strict: pending -> processing -> {completed | failed}.
    fn transition_compliance(
        &self,
        id: i64,
        to: ComplianceStatus,
        processed: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> StoreResult<ComplianceRequest>;
}
