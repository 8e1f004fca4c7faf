use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::info;

use crewline_types::api::{AttachmentUpload, ChannelAnalytics, SearchFilter};
use crewline_types::models::{
    Attachment, AuditRecord, CaseStatus, Channel, ComplianceKind, ComplianceRequest,
    ComplianceStatus, MemberRole, Membership, Message, ModerationCase,
};

use crate::migrations;
use crate::models::{
    NewAudit, NewCase, NewChannel, NewMessage, attachment_from_row, audit_from_row, case_from_row,
    channel_from_row, compliance_from_row, fmt_ts, membership_from_row, message_from_row,
};
use crate::{Store, StoreError, StoreHealth, StoreResult};

/// SQLite-backed store. One connection behind a mutex; WAL mode for
/// concurrent readers. Callers run these methods under `spawn_blocking`.
pub struct DurableStore {
    conn: Mutex<Connection>,
}

impl DurableStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        info!("Database opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory SQLite database, mainly for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
        f(&conn)
    }
}

impl Store for DurableStore {
    fn health(&self) -> StoreHealth {
        let tables_exist = self
            .with_conn(|conn| {
                let n: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master
                     WHERE type = 'table' AND name IN ('channels', 'channel_members', 'messages')",
                    [],
                    |row| row.get(0),
                )?;
                Ok(n == 3)
            })
            .unwrap_or(false);

        StoreHealth {
            durable: true,
            tables_exist,
        }
    }

    // -- Channels --

    fn create_channel(&self, new: &NewChannel) -> StoreResult<Channel> {
        self.with_conn(|conn| {
            let ts = fmt_ts(new.created_at);
            conn.execute(
                "INSERT INTO channels
                   (name, description, channel_type, is_private, max_members,
                    created_by, created_at, updated_at, last_activity_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?7)",
                rusqlite::params![
                    new.name,
                    new.description,
                    new.channel_type.as_str(),
                    new.is_private,
                    new.max_members,
                    new.created_by,
                    ts,
                ],
            )?;
            query_channel(conn, conn.last_insert_rowid())?.ok_or(StoreError::NotFound("channel"))
        })
    }

    fn channel(&self, id: i64) -> StoreResult<Channel> {
        self.with_conn(|conn| query_channel(conn, id)?.ok_or(StoreError::NotFound("channel")))
    }

    fn channels_for_user(&self, user_id: i64) -> StoreResult<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.* FROM channels c
                 JOIN channel_members cm ON cm.channel_id = c.id
                 WHERE cm.user_id = ?1 AND cm.is_active = 1
                 ORDER BY c.last_activity_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], channel_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn touch_channel(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_conn(|conn| {
            // String MAX keeps last_activity_at monotonic (fixed-width RFC 3339).
            let changed = conn.execute(
                "UPDATE channels
                 SET last_activity_at = MAX(last_activity_at, ?2), updated_at = ?2
                 WHERE id = ?1",
                rusqlite::params![id, fmt_ts(at)],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("channel"));
            }
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
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE channels
                 SET is_archived = COALESCE(?2, is_archived),
                     is_read_only = COALESCE(?3, is_read_only),
                     updated_at = ?4
                 WHERE id = ?1",
                rusqlite::params![id, is_archived, is_read_only, fmt_ts(at)],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound("channel"));
            }
            Ok(())
        })?;
        self.channel(id)
    }

    // -- Membership --

    fn add_member(
        &self,
        channel_id: i64,
        user_id: i64,
        role: MemberRole,
        at: DateTime<Utc>,
    ) -> StoreResult<Membership> {
        self.with_conn(|conn| {
            let channel =
                query_channel(conn, channel_id)?.ok_or(StoreError::NotFound("channel"))?;

            if let Some(max) = channel.max_members {
                let active: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM channel_members
                     WHERE channel_id = ?1 AND is_active = 1 AND user_id != ?2",
                    rusqlite::params![channel_id, user_id],
                    |row| row.get(0),
                )?;
                if active >= max {
                    return Err(StoreError::Conflict(format!(
                        "channel {} is full ({} members)",
                        channel_id, max
                    )));
                }
            }

            conn.execute(
                "INSERT INTO channel_members (channel_id, user_id, role, joined_at, is_active)
                 VALUES (?1, ?2, ?3, ?4, 1)
                 ON CONFLICT(channel_id, user_id)
                 DO UPDATE SET is_active = 1, role = excluded.role",
                rusqlite::params![channel_id, user_id, role.as_str(), fmt_ts(at)],
            )?;

            conn.query_row(
                "SELECT * FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                rusqlite::params![channel_id, user_id],
                membership_from_row,
            )
            .map_err(StoreError::from)
        })
    }

    fn remove_member(&self, channel_id: i64, user_id: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            let membership = conn
                .query_row(
                    "SELECT * FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    rusqlite::params![channel_id, user_id],
                    membership_from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound("membership"))?;

            if !membership.is_active {
                return Ok(());
            }

            // A channel keeps at least one active owner while any other
            // membership remains active.
            if membership.role == MemberRole::Owner {
                let other_owners: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM channel_members
                     WHERE channel_id = ?1 AND is_active = 1
                       AND role = 'owner' AND user_id != ?2",
                    rusqlite::params![channel_id, user_id],
                    |row| row.get(0),
                )?;
                let other_actives: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM channel_members
                     WHERE channel_id = ?1 AND is_active = 1 AND user_id != ?2",
                    rusqlite::params![channel_id, user_id],
                    |row| row.get(0),
                )?;
                if other_owners == 0 && other_actives > 0 {
                    return Err(StoreError::Conflict(
                        "cannot remove the last owner of an active channel".into(),
                    ));
                }
            }

            conn.execute(
                "UPDATE channel_members SET is_active = 0
                 WHERE channel_id = ?1 AND user_id = ?2",
                rusqlite::params![channel_id, user_id],
            )?;
            Ok(())
        })
    }

    fn is_active_member(&self, channel_id: i64, user_id: i64) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM channel_members
                 WHERE channel_id = ?1 AND user_id = ?2 AND is_active = 1",
                rusqlite::params![channel_id, user_id],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    fn active_member_ids(&self, channel_id: i64) -> StoreResult<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM channel_members
                 WHERE channel_id = ?1 AND is_active = 1",
            )?;
            let ids = stmt
                .query_map([channel_id], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    // -- Messages --

    fn insert_message(&self, new: &NewMessage) -> StoreResult<Message> {
        self.with_conn(|conn| {
            let ts = fmt_ts(new.created_at);
            conn.execute(
                "INSERT INTO messages
                   (channel_id, sender_id, content, message_type,
                    reply_to_id, thread_root_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![
                    new.channel_id,
                    new.sender_id,
                    new.content,
                    new.message_type.as_str(),
                    new.reply_to_id,
                    new.thread_root_id,
                    ts,
                ],
            )?;
            query_message(conn, conn.last_insert_rowid())?.ok_or(StoreError::NotFound("message"))
        })
    }

    fn message(&self, id: i64) -> StoreResult<Message> {
        self.with_conn(|conn| query_message(conn, id)?.ok_or(StoreError::NotFound("message")))
    }

    fn messages_page(
        &self,
        channel_id: i64,
        limit: u32,
        offset: u32,
        before: Option<DateTime<Utc>>,
    ) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let rows = match before {
                Some(cursor) => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM messages
                         WHERE channel_id = ?1 AND created_at < ?2
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?3 OFFSET ?4",
                    )?;
                    stmt.query_map(
                        rusqlite::params![channel_id, fmt_ts(cursor), limit, offset],
                        message_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?
                }
                None => {
                    let mut stmt = conn.prepare(
                        "SELECT * FROM messages
                         WHERE channel_id = ?1
                         ORDER BY created_at DESC, id DESC
                         LIMIT ?2 OFFSET ?3",
                    )?;
                    stmt.query_map(
                        rusqlite::params![channel_id, limit, offset],
                        message_from_row,
                    )?
                    .collect::<Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    fn soft_delete_message(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        self.with_conn(|conn| {
            if query_message(conn, id)?.is_none() {
                return Err(StoreError::NotFound("message"));
            }
            // Second delete is a no-op; updated_at only moves on the first.
            conn.execute(
                "UPDATE messages SET is_deleted = 1, updated_at = ?2
                 WHERE id = ?1 AND is_deleted = 0",
                rusqlite::params![id, fmt_ts(at)],
            )?;
            Ok(())
        })
    }

    fn insert_attachment(
        &self,
        message_id: i64,
        upload: &AttachmentUpload,
    ) -> StoreResult<Attachment> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO attachments
                   (message_id, file_name, file_type, file_size, url, thumbnail_url, mime_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    message_id,
                    upload.file_name,
                    upload.file_type,
                    upload.file_size,
                    upload.url,
                    upload.thumbnail_url,
                    upload.mime_type,
                ],
            )?;
            conn.query_row(
                "SELECT * FROM attachments WHERE id = ?1",
                [conn.last_insert_rowid()],
                attachment_from_row,
            )
            .map_err(StoreError::from)
        })
    }

    fn attachments_for_messages(&self, message_ids: &[i64]) -> StoreResult<Vec<Attachment>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT * FROM attachments WHERE message_id IN ({}) ORDER BY id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), attachment_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn add_reaction(
        &self,
        message_id: i64,
        user_id: i64,
        kind: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            if query_message(conn, message_id)?.is_none() {
                return Err(StoreError::NotFound("message"));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, user_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![message_id, user_id, kind, fmt_ts(at)],
            )?;
            Ok(inserted > 0)
        })
    }

    fn insert_read_receipt(
        &self,
        message_id: i64,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.with_conn(|conn| {
            if query_message(conn, message_id)?.is_none() {
                return Err(StoreError::NotFound("message"));
            }
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![message_id, user_id, fmt_ts(at)],
            )?;
            Ok(inserted > 0)
        })
    }

    // -- Audit --

    fn record_audit(&self, new: &NewAudit) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log
                   (action, actor_id, channel_id, message_id, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    new.action,
                    new.actor_id,
                    new.channel_id,
                    new.message_id,
                    new.payload.to_string(),
                    fmt_ts(new.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn recent_audit(&self, limit: u32) -> StoreResult<Vec<AuditRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM audit_log ORDER BY created_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], audit_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Moderation --

    fn create_case(&self, new: &NewCase) -> StoreResult<ModerationCase> {
        self.with_conn(|conn| {
            if query_message(conn, new.message_id)?.is_none() {
                return Err(StoreError::NotFound("message"));
            }

            let ts = fmt_ts(new.created_at);
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO moderation_cases
                   (message_id, flagged_by, reason, severity, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
                rusqlite::params![
                    new.message_id,
                    new.flagged_by,
                    new.reason,
                    new.severity.as_str(),
                    ts,
                ],
            )?;
            let case_id = tx.last_insert_rowid();
            // Flagged state is visible on the message without joining the
            // case table.
            tx.execute(
                "UPDATE messages
                 SET is_flagged = 1, flag_reason = ?2, flagged_by = ?3, flagged_at = ?4
                 WHERE id = ?1",
                rusqlite::params![new.message_id, new.reason, new.flagged_by, ts],
            )?;
            tx.commit()?;

            conn.query_row(
                "SELECT * FROM moderation_cases WHERE id = ?1",
                [case_id],
                case_from_row,
            )
            .map_err(StoreError::from)
        })
    }

    fn moderation_case(&self, id: i64) -> StoreResult<ModerationCase> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM moderation_cases WHERE id = ?1",
                [id],
                case_from_row,
            )
            .optional()?
            .ok_or(StoreError::NotFound("moderation case"))
        })
    }

    fn pending_cases(&self) -> StoreResult<Vec<ModerationCase>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM moderation_cases
                 WHERE status = 'pending'
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt
                .query_map([], case_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
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
        self.with_conn(|conn| {
            let case = conn
                .query_row(
                    "SELECT * FROM moderation_cases WHERE id = ?1",
                    [id],
                    case_from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound("moderation case"))?;

            if !case.status.can_transition_to(to) {
                return Err(StoreError::InvalidTransition {
                    from: case.status.as_str().into(),
                    to: to.as_str().into(),
                });
            }

            conn.execute(
                "UPDATE moderation_cases
                 SET status = ?2, reviewed_by = ?3,
                     action_notes = COALESCE(?4, action_notes), updated_at = ?5
                 WHERE id = ?1",
                rusqlite::params![id, to.as_str(), reviewer_id, notes, fmt_ts(at)],
            )?;

            conn.query_row(
                "SELECT * FROM moderation_cases WHERE id = ?1",
                [id],
                case_from_row,
            )
            .map_err(StoreError::from)
        })
    }

    // -- Search & analytics --

    fn search_messages(&self, user_id: i64, filter: &SearchFilter) -> StoreResult<Vec<Message>> {
        self.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT m.* FROM messages m
                 JOIN channel_members cm
                   ON cm.channel_id = m.channel_id
                  AND cm.user_id = ?1 AND cm.is_active = 1
                 WHERE m.is_deleted = 0",
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(user_id)];

            if let Some(channel_id) = filter.channel_id {
                params.push(Box::new(channel_id));
                sql.push_str(&format!(" AND m.channel_id = ?{}", params.len()));
            }
            if let Some(query) = filter.query.as_deref().filter(|q| !q.is_empty()) {
                params.push(Box::new(format!("%{}%", query)));
                sql.push_str(&format!(" AND m.content LIKE ?{}", params.len()));
            }
            if let Some(after) = filter.after {
                params.push(Box::new(fmt_ts(after)));
                sql.push_str(&format!(" AND m.created_at >= ?{}", params.len()));
            }
            if let Some(before) = filter.before {
                params.push(Box::new(fmt_ts(before)));
                sql.push_str(&format!(" AND m.created_at <= ?{}", params.len()));
            }

            params.push(Box::new(filter.limit));
            sql.push_str(&format!(
                " ORDER BY m.created_at DESC, m.id DESC LIMIT ?{}",
                params.len()
            ));
            params.push(Box::new(filter.offset));
            sql.push_str(&format!(" OFFSET ?{}", params.len()));

            let mut stmt = conn.prepare(&sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let rows = stmt
                .query_map(param_refs.as_slice(), message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn channel_analytics(
        &self,
        channel_id: i64,
        days: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<ChannelAnalytics> {
        self.with_conn(|conn| {
            if query_channel(conn, channel_id)?.is_none() {
                return Err(StoreError::NotFound("channel"));
            }

            let days = days.max(1);
            let cutoff = fmt_ts(now - Duration::days(days as i64));

            let (total_messages, distinct_senders, flagged_count): (i64, i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COUNT(DISTINCT sender_id), COALESCE(SUM(is_flagged), 0)
                     FROM messages
                     WHERE channel_id = ?1 AND is_deleted = 0 AND created_at >= ?2",
                    rusqlite::params![channel_id, cutoff],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )?;

            // Tie-break policy: on equal counts, the lowest hour id wins.
            let peak_hour: Option<u32> = conn
                .query_row(
                    "SELECT CAST(strftime('%H', created_at) AS INTEGER) AS hour
                     FROM messages
                     WHERE channel_id = ?1 AND is_deleted = 0 AND created_at >= ?2
                     GROUP BY hour
                     ORDER BY COUNT(*) DESC, hour ASC
                     LIMIT 1",
                    rusqlite::params![channel_id, cutoff],
                    |row| row.get(0),
                )
                .optional()?;

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
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO compliance_requests
                   (user_id, kind, status, requested_payload, created_at)
                 VALUES (?1, ?2, 'pending', ?3, ?4)",
                rusqlite::params![user_id, kind.as_str(), requested.to_string(), fmt_ts(at)],
            )?;
            conn.query_row(
                "SELECT * FROM compliance_requests WHERE id = ?1",
                [conn.last_insert_rowid()],
                compliance_from_row,
            )
            .map_err(StoreError::from)
        })
    }

    fn compliance_request(&self, id: i64) -> StoreResult<ComplianceRequest> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT * FROM compliance_requests WHERE id = ?1",
                [id],
                compliance_from_row,
            )
            .optional()?
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
        self.with_conn(|conn| {
            let request = conn
                .query_row(
                    "SELECT * FROM compliance_requests WHERE id = ?1",
                    [id],
                    compliance_from_row,
                )
                .optional()?
                .ok_or(StoreError::NotFound("compliance request"))?;

            if !request.status.can_transition_to(to) {
                return Err(StoreError::InvalidTransition {
                    from: request.status.as_str().into(),
                    to: to.as_str().into(),
                });
            }

            let completed_at = matches!(
                to,
                ComplianceStatus::Completed | ComplianceStatus::Failed
            )
            .then(|| fmt_ts(at));

            conn.execute(
                "UPDATE compliance_requests
                 SET status = ?2,
                     processed_payload = COALESCE(?3, processed_payload),
                     completed_at = COALESCE(?4, completed_at)
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    to.as_str(),
                    processed.map(|p| p.to_string()),
                    completed_at,
                ],
            )?;

            conn.query_row(
                "SELECT * FROM compliance_requests WHERE id = ?1",
                [id],
                compliance_from_row,
            )
            .map_err(StoreError::from)
        })
    }
}

fn query_channel(conn: &Connection, id: i64) -> StoreResult<Option<Channel>> {
    conn.query_row("SELECT * FROM channels WHERE id = ?1", [id], channel_from_row)
        .optional()
        .map_err(StoreError::from)
}

fn query_message(conn: &Connection, id: i64) -> StoreResult<Option<Message>> {
    conn.query_row("SELECT * FROM messages WHERE id = ?1", [id], message_from_row)
        .optional()
        .map_err(StoreError::from)
}

/// Extension trait for optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
