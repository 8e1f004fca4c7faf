use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Timelike, Utc};

use crewline_types::api::{AttachmentUpload, ChannelAnalytics, SearchFilter};
use crewline_types::models::{
    Attachment, AuditRecord, CaseStatus, Channel, ComplianceKind, ComplianceRequest,
    ComplianceStatus, MemberRole, Membership, Message, ModerationCase,
};

use crate::models::{NewAudit, NewCase, NewChannel, NewMessage};
use crate::{Store, StoreError, StoreHealth, StoreResult};

/// Best-effort fallback when no durable store is configured (or it failed to
/// open). Same contract as `DurableStore`, nothing survives a restart, and
/// the health surface reports it as unavailable so the broadcast engine runs
/// in degraded mode.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    channels: BTreeMap<i64, Channel>,
    memberships: HashMap<(i64, i64), Membership>,
    messages: BTreeMap<i64, Message>,
    attachments: Vec<Attachment>,
    reactions: HashSet<(i64, i64, String)>,
    receipts: HashSet<(i64, i64)>,
    cases: BTreeMap<i64, ModerationCase>,
    compliance: BTreeMap<i64, ComplianceRequest>,
    audit: Vec<AuditRecord>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn with_inner<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Inner) -> StoreResult<T>,
    {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| StoreError::Unavailable("state lock poisoned".into()))?;
        f(&mut inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn health(&self) -> StoreHealth {
        StoreHealth {
            durable: false,
            tables_exist: false,
        }
    }

    // -- Channels --

    fn create_channel(&self, new: &NewChannel) -> StoreResult<Channel> {
        self.with_inner(|inner| {
            if inner.channels.values().any(|c| c.name == new.name) {
                return Err(StoreError::Conflict(format!(
                    "channel name '{}' already exists",
                    new.name
                )));
            }
            let id = inner.next_id();
            let channel = Channel {
                id,
                name: new.name.clone(),
                description: new.description.clone(),
                channel_type: new.channel_type,
                is_private: new.is_private,
                is_archived: false,
                is_read_only: false,
                max_members: new.max_members,
                created_by: new.created_by,
                created_at: new.created_at,
                updated_at: new.created_at,
                last_activity_at: new.created_at,
                settings: Default::default(),
            };
            inner.channels.insert(id, channel.clone());
            Ok(channel)
        })
    }

    fn channel(&self, id: i64) -> StoreResult<Channel> {
        self.with_inner(|inner| {
            inner
                .channels
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound("channel"))
        })
    }

    fn channels_for_user(&self, user_id: i64) -> StoreResult<Vec<Channel>> {
        self.with_inner(|inner| {
            let mut channels: Vec<Channel> = inner
                .memberships
                .values()
                .filter(|m| m.user_id == user_id && m.is_active)
                .filter_map(|m| inner.channels.get(&m.channel_id).cloned())
                .collect();
            channels.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
            Ok(channels)
        })
    }

    fn touch_channel(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_inner(|inner| {
            let channel = inner
                .channels
                .get_mut(&id)
                .ok_or(StoreError::NotFound("channel"))?;
            if at > channel.last_activity_at {
                channel.last_activity_at = at;
            }
            channel.updated_at = at;
            Ok(())
        })
    }

    fn set_channel_flags(
        &self,
        id: i64,
        is_archived: Option<bool>,
        is_read_only: Option<bool>,
        at: DateTime<Utc>,
    ) -> StoreResult<Channel> {
        self.with_inner(|inner| {
            let channel = inner
                .channels
                .get_mut(&id)
                .ok_or(StoreError::NotFound("channel"))?;
            if let Some(archived) = is_archived {
                channel.is_archived = archived;
            }
            if let Some(read_only) = is_read_only {
                channel.is_read_only = read_only;
            }
            channel.updated_at = at;
            Ok(channel.clone())
        })
    }

    // -- Membership --

    fn add_member(
        &self,
        channel_id: i64,
        user_id: i64,
        role: MemberRole,
        at: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        self.with_inner(|inner| {
            let channel = inner
                .channels
                .get(&channel_id)
                .ok_or(StoreError::NotFound("channel"))?;

            if let Some(max) = channel.max_members {
                let active = inner
                    .memberships
                    .values()
                    .filter(|m| m.channel_id == channel_id && m.is_active && m.user_id != user_id)
                    .count() as i64;
                if active >= max {
                    return Err(StoreError::Conflict(format!(
                        "channel {} is full ({} members)",
                        channel_id, max
                    )));
                }
            }

            let membership = inner
                .memberships
                .entry((channel_id, user_id))
                .and_modify(|m| {
                    m.is_active = true;
                    m.role = role;
                })
                .or_insert(Membership {
                    channel_id,
                    user_id,
                    role,
                    joined_at: at,
                    is_active: true,
                });
            Ok(membership.clone())
        })
    }

    fn remove_member(&self, channel_id: i64, user_id: i64) -> StoreResult<()> {
        self.with_inner(|inner| {
            let membership = inner
                .memberships
                .get(&(channel_id, user_id))
                .cloned()
                .ok_or(StoreError::NotFound("membership"))?;

            if !membership.is_active {
                return Ok(());
            }

            if membership.role == MemberRole::Owner {
                let other_owners = inner
                    .memberships
                    .values()
                    .filter(|m| {
                        m.channel_id == channel_id
                            && m.is_active
                            && m.role == MemberRole::Owner
                            && m.user_id != user_id
                    })
                    .count();
                let other_actives = inner
                    .memberships
                    .values()
                    .filter(|m| m.channel_id == channel_id && m.is_active && m.user_id != user_id)
                    .count();
                if other_owners == 0 && other_actives > 0 {
                    return Err(StoreError::Conflict(
                        "cannot remove the last owner of an active channel".into(),
                    ));
                }
            }

            if let Some(m) = inner.memberships.get_mut(&(channel_id, user_id)) {
                m.is_active = false;
            }
            Ok(())
        })
    }

    fn is_active_member(&self, channel_id: i64, user_id: i64) -> StoreResult<bool> {
        self.with_inner(|inner| {
            Ok(inner
                .memberships
                .get(&(channel_id, user_id))
                .is_some_and(|m| m.is_active))
        })
    }

    fn active_member_ids(&self, channel_id: i64) -> StoreResult<Vec<i64>> {
        self.with_inner(|inner| {
            Ok(inner
                .memberships
                .values()
                .filter(|m| m.channel_id == channel_id && m.is_active)
                .map(|m| m.user_id)
                .collect())
        })
    }

    // -- Messages --

    fn insert_message(&self, new: &NewMessage) -> StoreResult<Message> {
        self.with_inner(|inner| {
            if !inner.channels.contains_key(&new.channel_id) {
                return Err(StoreError::NotFound("channel"));
            }
            let id = inner.next_id();
            let message = Message {
                id,
                channel_id: new.channel_id,
                sender_id: new.sender_id,
                content: new.content.clone(),
                message_type: new.message_type,
                reply_to_id: new.reply_to_id,
                thread_root_id: new.thread_root_id,
                is_edited: false,
                is_deleted: false,
                is_pinned: false,
                is_flagged: false,
                flag_reason: None,
                flagged_by: None,
                flagged_at: None,
                created_at: new.created_at,
                updated_at: new.created_at,
            };
            inner.messages.insert(id, message.clone());
            Ok(message)
        })
    }

    fn message(&self, id: i64) -> StoreResult<Message> {
        self.with_inner(|inner| {
            inner
                .messages
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound("message"))
        })
    }

    fn messages_page(
        &self,
        channel_id: i64,
        limit: u32,
        offset: u32,
        before: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        self.with_inner(|inner| {
            let mut rows: Vec<Message> = inner
                .messages
                .values()
                .filter(|m| m.channel_id == channel_id)
                .filter(|m| before.is_none_or(|cursor| m.created_at < cursor))
                .cloned()
                .collect();
            rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            Ok(rows
                .into_iter()
                .skip(offset as usize)
                .take(limit as usize)
                .collect())
        })
    }

    fn soft_delete_message(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_inner(|inner| {
            let message = inner
                .messages
                .get_mut(&id)
                .ok_or(StoreError::NotFound("message"))?;
            if !message.is_deleted {
                message.is_deleted = true;
                message.updated_at = at;
            }
            Ok(())
        })
    }

    fn insert_attachment(
        &self,
        message_id: i64,
        upload: &AttachmentUpload,
    ) -> StoreResult<Attachment> {
        self.with_inner(|inner| {
            if !inner.messages.contains_key(&message_id) {
                return Err(StoreError::NotFound("message"));
            }
            let id = inner.next_id();
            let attachment = Attachment {
                id,
                message_id,
                file_name: upload.file_name.clone(),
                file_type: upload.file_type.clone(),
                file_size: upload.file_size,
                url: upload.url.clone(),
                thumbnail_url: upload.thumbnail_url.clone(),
                mime_type: upload.mime_type.clone(),
            };
            inner.attachments.push(attachment.clone());
            Ok(attachment)
        })
    }

    fn attachments_for_messages(&self, message_ids: &[i64]) -> StoreResult<Vec<Attachment>> {
        self.with_inner(|inner| {
            Ok(inner
                .attachments
                .iter()
                .filter(|a| message_ids.contains(&a.message_id))
                .cloned()
                .collect())
        })
    }

    fn add_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        kind: &str,
        _at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_inner(|inner| {
            if !inner.messages.contains_key(&message_id) {
                return Err(StoreError::NotFound("message"));
            }
            Ok(inner
                .reactions
                .insert((message_id, user_id, kind.to_string())))
        })
    }

    fn insert_read_receipt(
        &self,
        message_id: i64,
        user_id: i64,
        _at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_inner(|inner| {
            if !inner.messages.contains_key(&message_id) {
                return Err(StoreError::NotFound("message"));
            }
            Ok(inner.receipts.insert((message_id, user_id)))
        })
    }

    // -- Audit --

    fn record_audit(&self, new: &NewAudit) -> StoreResult<()> {
        self.with_inner(|inner| {
            let id = inner.next_id();
            inner.audit.push(AuditRecord {
                id,
                action: new.action.clone(),
                actor_id: new.actor_id,
                channel_id: new.channel_id,
                message_id: new.message_id,
                payload: new.payload.clone(),
                created_at: new.created_at,
            });
            Ok(())
        })
    }

    fn recent_audit(&self, limit: u32) -> StoreResult<Vec<AuditRecord>> {
        self.with_inner(|inner| {
            let mut rows = inner.audit.clone();
            rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            rows.truncate(limit as usize);
            Ok(rows)
        })
    }

    // -- Moderation --

    fn create_case(&self, new: &NewCase) -> StoreResult<ModerationCase> {
        self.with_inner(|inner| {
            let id = inner.next_id();
            let message = inner
                .messages
                .get_mut(&new.message_id)
                .ok_or(StoreError::NotFound("message"))?;
            message.is_flagged = true;
            message.flag_reason = Some(new.reason.clone());
            message.flagged_by = Some(new.flagged_by);
            message.flagged_at = Some(new.created_at);

            let case = ModerationCase {
                id,
                message_id: new.message_id,
                flagged_by: new.flagged_by,
                reason: new.reason.clone(),
                severity: new.severity,
                status: CaseStatus::Pending,
                reviewed_by: None,
                action_notes: None,
                created_at: new.created_at,
                updated_at: new.created_at,
            };
            inner.cases.insert(id, case.clone());
            Ok(case)
        })
    }

    fn moderation_case(&self, id: i64) -> StoreResult<ModerationCase> {
        self.with_inner(|inner| {
            inner
                .cases
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound("moderation case"))
        })
    }

    fn pending_cases(&self) -> StoreResult<Vec<ModerationCase>> {
        self.with_inner(|inner| {
            let mut rows: Vec<ModerationCase> = inner
                .cases
                .values()
                .filter(|c| c.status == CaseStatus::Pending)
                .cloned()
                .collect();
            rows.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
            Ok(rows)
        })
    }

    fn transition_case(
        &self,
        id: i64,
        to: CaseStatus,
        reviewer_id: i64,
        notes: Option<&str>,
        at: DateTime<Utc>,
    ) -> StoreResult<ModerationCase> {
        self.with_inner(|inner| {
            let case = inner
                .cases
                .get_mut(&id)
                .ok_or(StoreError::NotFound("moderation case"))?;

            if !case.status.can_transition_to(to) {
                return Err(StoreError::InvalidTransition {
                    from: case.status.as_str().into(),
                    to: to.as_str().into(),
                });
            }

            case.status = to;
            case.reviewed_by = Some(reviewer_id);
            if let Some(notes) = notes {
                case.action_notes = Some(notes.to_string());
            }
            case.updated_at = at;
            Ok(case.clone())
        })
    }

    // -- Search & analytics --

    fn search_messages(&self, user_id: i64, filter: &SearchFilter) -> StoreResult<Vec<Message>> {
        self.with_inner(|inner| {
            let member_channels: HashSet<i64> = inner
                .memberships
                .values()
                .filter(|m| m.user_id == user_id && m.is_active)
                .map(|m| m.channel_id)
                .collect();

            let mut rows: Vec<Message> = inner
                .messages
                .values()
                .filter(|m| !m.is_deleted && member_channels.contains(&m.channel_id))
                .filter(|m| filter.channel_id.is_none_or(|cid| m.channel_id == cid))
                .filter(|m| {
                    filter
                        .query
                        .as_deref()
                        .filter(|q| !q.is_empty())
                        .is_none_or(|q| m.content.contains(q))
                })
                .filter(|m| filter.after.is_none_or(|t| m.created_at >= t))
                .filter(|m| filter.before.is_none_or(|t| m.created_at <= t))
                .cloned()
                .collect();
            rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
            Ok(rows
                .into_iter()
                .skip(filter.offset as usize)
                .take(filter.limit as usize)
                .collect())
        })
    }

    fn channel_analytics(
        &self,
        channel_id: i64,
        days: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<ChannelAnalytics> {
        self.with_inner(|inner| {
            if !inner.channels.contains_key(&channel_id) {
                return Err(StoreError::NotFound("channel"));
            }

            let days = days.max(1);
            let cutoff = now - Duration::days(days as i64);
            let window: Vec<&Message> = inner
                .messages
                .values()
                .filter(|m| m.channel_id == channel_id && !m.is_deleted && m.created_at >= cutoff)
                .collect();

            let total_messages = window.len() as i64;
            let distinct_senders = window
                .iter()
                .map(|m| m.sender_id)
                .collect::<HashSet<_>>()
                .len() as i64;
            let flagged_count = window.iter().filter(|m| m.is_flagged).count() as i64;

            let mut by_hour: HashMap<u32, i64> = HashMap::new();
            for m in &window {
                *by_hour.entry(m.created_at.hour()).or_default() += 1;
            }
            let peak_hour = by_hour
                .into_iter()
                .max_by(|(ha, na), (hb, nb)| na.cmp(nb).then(hb.cmp(ha)))
                .map(|(hour, _)| hour);

            let messages_per_day =
                ((total_messages as f64 / days as f64) * 100.0).round() / 100.0;

            Ok(ChannelAnalytics {
                channel_id,
                window_days: days,
                total_messages,
                distinct_senders,
                messages_per_day,
                flagged_count,
                peak_hour,
            })
        })
    }

    // -- Compliance --

    fn submit_compliance(
        &self,
        user_id: i64,
        kind: ComplianceKind,
        requested: serde_json::Value,
        at: DateTime<Utc>,
    ) -> StoreResult<ComplianceRequest> {
        self.with_inner(|inner| {
            let id = inner.next_id();
            let request = ComplianceRequest {
                id,
                user_id,
                kind,
                status: ComplianceStatus::Pending,
                requested_payload: Some(requested),
                processed_payload: None,
                completed_at: None,
                created_at: at,
            };
            inner.compliance.insert(id, request.clone());
            Ok(request)
        })
    }

    fn compliance_request(&self, id: i64) -> StoreResult<ComplianceRequest> {
        self.with_inner(|inner| {
            inner
                .compliance
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound("compliance request"))
        })
    }

    fn transition_compliance(
        &self,
        id: i64,
        to: ComplianceStatus,
        processed: Option<serde_json::Value>,
        at: DateTime<Utc>,
    ) -> StoreResult<ComplianceRequest> {
        self.with_inner(|inner| {
            let request = inner
                .compliance
                .get_mut(&id)
                .ok_or(StoreError::NotFound("compliance request"))?;

            if !request.status.can_transition_to(to) {
                return Err(StoreError::InvalidTransition {
                    from: request.status.as_str().into(),
                    to: to.as_str().into(),
                });
            }

            request.status = to;
            if let Some(processed) = processed {
                request.processed_payload = Some(processed);
            }
            if matches!(to, ComplianceStatus::Completed | ComplianceStatus::Failed) {
                request.completed_at = Some(at);
            }
            Ok(request.clone())
        })
    }
}
