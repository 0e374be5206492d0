use rusqlite::Connection;

use crate::error::Result;

/// Initialise the store schema in `conn`. The `unique` constraints on
/// `leads.phone`, `conversations.phone`, and `messages.external_id` are
/// load-bearing: they are what makes `get_or_create_conversation` and
/// `insert_message` atomic upserts instead of read-then-insert races.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS leads (
            id              TEXT    NOT NULL PRIMARY KEY,
            phone           TEXT    NOT NULL UNIQUE,
            name            TEXT,
            email           TEXT,
            stage           TEXT    NOT NULL DEFAULT 'initial_contact',
            score           INTEGER NOT NULL DEFAULT 0,
            metadata        TEXT    NOT NULL DEFAULT '{}',
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL,
            external_crm_id TEXT
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id               TEXT NOT NULL PRIMARY KEY,
            phone            TEXT NOT NULL UNIQUE,
            lead_id          TEXT NOT NULL REFERENCES leads(id),
            last_message_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id TEXT    NOT NULL REFERENCES conversations(id),
            phone           TEXT    NOT NULL,
            direction       TEXT    NOT NULL,
            content         TEXT    NOT NULL DEFAULT '',
            media_type      TEXT    NOT NULL DEFAULT 'none',
            media_ref       TEXT,
            timestamp       TEXT    NOT NULL,
            external_id     TEXT    NOT NULL UNIQUE
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation_ts
            ON messages (conversation_id, timestamp);

        CREATE TABLE IF NOT EXISTS follow_ups (
            id               TEXT    NOT NULL PRIMARY KEY,
            lead_id          TEXT    NOT NULL REFERENCES leads(id),
            type             TEXT    NOT NULL,
            scheduled_for    TEXT    NOT NULL,
            status           TEXT    NOT NULL DEFAULT 'pending',
            attempt_number   INTEGER NOT NULL DEFAULT 1,
            message_override TEXT,
            created_at       TEXT    NOT NULL,
            executed_at      TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_follow_ups_due
            ON follow_ups (status, scheduled_for);
        CREATE INDEX IF NOT EXISTS idx_follow_ups_lead
            ON follow_ups (lead_id, status);
        ",
    )?;
    Ok(())
}
