use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channels (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            name              TEXT NOT NULL UNIQUE,
            description       TEXT,
            channel_type      TEXT NOT NULL DEFAULT 'general',
            is_private        INTEGER NOT NULL DEFAULT 0,
            is_archived       INTEGER NOT NULL DEFAULT 0,
            is_read_only      INTEGER NOT NULL DEFAULT 0,
            max_members       INTEGER,
            created_by        INTEGER NOT NULL,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL,
            last_activity_at  TEXT NOT NULL,
            settings          TEXT NOT NULL DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS channel_members (
            channel_id  INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL,
            role        TEXT NOT NULL DEFAULT 'member',
            joined_at   TEXT NOT NULL,
            is_active   INTEGER NOT NULL DEFAULT 1,
            PRIMARY KEY (channel_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            channel_id      INTEGER NOT NULL REFERENCES channels(id) ON DELETE CASCADE,
            sender_id       INTEGER NOT NULL,
            content         TEXT NOT NULL,
            message_type    TEXT NOT NULL DEFAULT 'text',
            reply_to_id     INTEGER REFERENCES messages(id),
            thread_root_id  INTEGER REFERENCES messages(id),
            is_edited       INTEGER NOT NULL DEFAULT 0,
            is_deleted      INTEGER NOT NULL DEFAULT 0,
            is_pinned       INTEGER NOT NULL DEFAULT 0,
            is_flagged      INTEGER NOT NULL DEFAULT 0,
            flag_reason     TEXT,
            flagged_by      INTEGER,
            flagged_at      TEXT,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE TABLE IF NOT EXISTS attachments (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id     INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            file_name      TEXT NOT NULL,
            file_type      TEXT NOT NULL,
            file_size      INTEGER NOT NULL,
            url            TEXT NOT NULL,
            thumbnail_url  TEXT,
            mime_type      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_attachments_message
            ON attachments(message_id);

        CREATE TABLE IF NOT EXISTS reactions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL,
            kind        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, user_id, kind)
        );

        CREATE TABLE IF NOT EXISTS read_receipts (
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL,
            read_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS moderation_cases (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id    INTEGER NOT NULL REFERENCES messages(id),
            flagged_by    INTEGER NOT NULL,
            reason        TEXT NOT NULL,
            severity      TEXT NOT NULL,
            status        TEXT NOT NULL DEFAULT 'pending',
            reviewed_by   INTEGER,
            action_notes  TEXT,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_cases_status
            ON moderation_cases(status, created_at);

        CREATE TABLE IF NOT EXISTS compliance_requests (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id            INTEGER NOT NULL,
            kind               TEXT NOT NULL,
            status             TEXT NOT NULL DEFAULT 'pending',
            requested_payload  TEXT,
            processed_payload  TEXT,
            completed_at       TEXT,
            created_at         TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            action      TEXT NOT NULL,
            actor_id    INTEGER NOT NULL,
            channel_id  INTEGER,
            message_id  INTEGER,
            payload     TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_created
            ON audit_log(created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
