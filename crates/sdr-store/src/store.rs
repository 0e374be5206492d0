//! SQLite-backed persistence for leads, conversations, messages, and
//! follow-ups — the one hot invariant enforced here ("one Conversation per
//! phone") is an atomic `INSERT OR IGNORE` + read-back upsert, never a
//! read-then-insert race.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use sdr_core::types::{
    Conversation, ConversationId, Direction, FollowUp, FollowUpId, FollowUpStatus, FollowUpType,
    Lead, LeadId, MediaType, Message, Phone, Stage,
};

use crate::db::init_db;
use crate::error::{Result, StoreError};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ---- leads -----------------------------------------------------------

    #[instrument(skip(self))]
    pub fn get_lead_by_phone(&self, phone: &Phone) -> Result<Option<Lead>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, phone, name, email, stage, score, metadata, created_at, updated_at, external_crm_id
             FROM leads WHERE phone = ?1",
            params![phone.as_str()],
            row_to_lead,
        )
        .optional()
        .map_err(StoreError::from)
    }

    pub fn get_lead(&self, lead_id: &LeadId) -> Result<Option<Lead>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, phone, name, email, stage, score, metadata, created_at, updated_at, external_crm_id
             FROM leads WHERE id = ?1",
            params![lead_id.as_str()],
            row_to_lead,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Atomic upsert keyed on phone: creates the lead if absent, otherwise
    /// merges the caller's fields into the existing row. Never read-then-insert.
    #[instrument(skip(self, lead), fields(phone = %lead.phone))]
    pub fn create_or_update_lead(&self, lead: &Lead) -> Result<Lead> {
        let conn = self.conn.lock().unwrap();
        let metadata = serde_json::to_string(&lead.metadata)?;
        conn.execute(
            "INSERT INTO leads (id, phone, name, email, stage, score, metadata, created_at, updated_at, external_crm_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(phone) DO UPDATE SET
                name = COALESCE(excluded.name, leads.name),
                email = COALESCE(excluded.email, leads.email),
                stage = excluded.stage,
                score = excluded.score,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at,
                external_crm_id = COALESCE(excluded.external_crm_id, leads.external_crm_id)",
            params![
                lead.lead_id.as_str(),
                lead.phone.as_str(),
                lead.name,
                lead.email,
                lead.stage.to_string(),
                lead.score,
                metadata,
                lead.created_at.to_rfc3339(),
                lead.updated_at.to_rfc3339(),
                lead.external_crm_id,
            ],
        )?;
        drop(conn);
        self.get_lead_by_phone(&lead.phone)?
            .ok_or_else(|| StoreError::LeadNotFound {
                id: lead.phone.as_str().to_string(),
            })
    }

    pub fn update_lead_stage(&self, lead_id: &LeadId, stage: Stage) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let changed = conn.execute(
            "UPDATE leads SET stage = ?1, updated_at = ?2 WHERE id = ?3",
            params![stage.to_string(), now, lead_id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::LeadNotFound {
                id: lead_id.to_string(),
            });
        }
        Ok(())
    }

    /// Shallow-merge `patch` into the lead's metadata object and persist it.
    pub fn merge_lead_metadata(
        &self,
        lead_id: &LeadId,
        patch: serde_json::Value,
    ) -> Result<Lead> {
        let conn = self.conn.lock().unwrap();
        let current: String = conn.query_row(
            "SELECT metadata FROM leads WHERE id = ?1",
            params![lead_id.as_str()],
            |r| r.get(0),
        )?;
        let mut merged: serde_json::Value =
            serde_json::from_str(&current).unwrap_or_else(|_| serde_json::json!({}));
        if let (Some(merged_obj), Some(patch_obj)) = (merged.as_object_mut(), patch.as_object()) {
            for (k, v) in patch_obj {
                merged_obj.insert(k.clone(), v.clone());
            }
        }
        let now = Utc::now().to_rfc3339();
        let merged_str = serde_json::to_string(&merged)?;
        conn.execute(
            "UPDATE leads SET metadata = ?1, updated_at = ?2 WHERE id = ?3",
            params![merged_str, now, lead_id.as_str()],
        )?;
        drop(conn);
        self.get_lead(lead_id)?.ok_or_else(|| StoreError::LeadNotFound {
            id: lead_id.to_string(),
        })
    }

    // ---- conversations -----------------------------------------------------

    pub fn get_conversation_by_phone(&self, phone: &Phone) -> Result<Option<Conversation>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, phone, lead_id, last_message_at FROM conversations WHERE phone = ?1",
            params![phone.as_str()],
            row_to_conversation,
        )
        .optional()
        .map_err(StoreError::from)
    }

    /// Atomic upsert on `phone` — the invariant from §9: "one Conversation per
    /// phone", enforced by `INSERT OR IGNORE` + read-back rather than a
    /// read-then-insert race.
    #[instrument(skip(self, lead_id))]
    pub fn get_or_create_conversation(&self, phone: &Phone, lead_id: &LeadId) -> Result<Conversation> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let new_id = ConversationId::new();
        conn.execute(
            "INSERT OR IGNORE INTO conversations (id, phone, lead_id, last_message_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![new_id.as_str(), phone.as_str(), lead_id.as_str(), now],
        )?;
        conn.query_row(
            "SELECT id, phone, lead_id, last_message_at FROM conversations WHERE phone = ?1",
            params![phone.as_str()],
            row_to_conversation,
        )
        .map_err(StoreError::from)
    }

    pub fn update_conversation_last_message_at(
        &self,
        phone: &Phone,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE conversations SET last_message_at = ?1 WHERE phone = ?2",
            params![at.to_rfc3339(), phone.as_str()],
        )?;
        Ok(())
    }

    // ---- messages -----------------------------------------------------------

    /// Insert a message, deduplicated by `external_id`. Returns `true` if a
    /// new row was inserted, `false` if the external id was already present
    /// (the at-least-once-delivery dedup law from §8).
    #[instrument(skip(self, msg), fields(external_id = %msg.message_id))]
    pub fn insert_message(&self, msg: &Message) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO messages
                (conversation_id, phone, direction, content, media_type, media_ref, timestamp, external_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                msg.conversation_id.as_str(),
                msg.phone.as_str(),
                msg.direction.to_string(),
                msg.content,
                media_type_str(msg.media_type),
                msg.media_ref,
                msg.timestamp.to_rfc3339(),
                msg.message_id,
            ],
        )?;
        if changed == 0 {
            debug!(external_id = %msg.message_id, "duplicate message ignored");
        }
        Ok(changed > 0)
    }

    pub fn get_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT conversation_id, phone, direction, content, media_type, media_ref, timestamp, external_id
             FROM messages WHERE conversation_id = ?1
             ORDER BY timestamp DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![conversation_id.as_str(), limit as i64], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().rev().collect())
    }

    // ---- follow-ups -----------------------------------------------------------

    pub fn insert_follow_up(&self, f: &FollowUp) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO follow_ups
                (id, lead_id, type, scheduled_for, status, attempt_number, message_override, created_at, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                f.follow_up_id.as_str(),
                f.lead_id.as_str(),
                f.kind.to_string(),
                f.scheduled_for.to_rfc3339(),
                f.status.to_string(),
                f.attempt_number,
                f.message_override,
                f.created_at.to_rfc3339(),
                f.executed_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Whether the lead already has a follow-up in flight (pending). Ordering
    /// guarantee from §4.E: at most one follow-up in flight per lead.
    pub fn has_pending_follow_up(&self, lead_id: &LeadId) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM follow_ups WHERE lead_id = ?1 AND status = 'pending'",
            params![lead_id.as_str()],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_due_follow_ups(&self, now: DateTime<Utc>) -> Result<Vec<FollowUp>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, lead_id, type, scheduled_for, status, attempt_number, message_override, created_at, executed_at
             FROM follow_ups WHERE status = 'pending' AND scheduled_for <= ?1
             ORDER BY scheduled_for ASC",
        )?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], row_to_follow_up)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn reschedule_follow_up(&self, id: &FollowUpId, new_time: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE follow_ups SET scheduled_for = ?1 WHERE id = ?2 AND status = 'pending'",
            params![new_time.to_rfc3339(), id.as_str()],
        )?;
        Ok(())
    }

    pub fn mark_follow_up(
        &self,
        id: &FollowUpId,
        status: FollowUpStatus,
        executed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE follow_ups SET status = ?1, executed_at = ?2 WHERE id = ?3 AND status = 'pending'",
            params![status.to_string(), executed_at.map(|t| t.to_rfc3339()), id.as_str()],
        )?;
        if changed == 0 {
            return Err(StoreError::FollowUpNotFound {
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn media_type_str(m: MediaType) -> &'static str {
    match m {
        MediaType::None => "none",
        MediaType::Image => "image",
        MediaType::Audio => "audio",
        MediaType::Document => "document",
    }
}

fn parse_media_type(s: &str) -> MediaType {
    match s {
        "image" => MediaType::Image,
        "audio" => MediaType::Audio,
        "document" => MediaType::Document,
        _ => MediaType::None,
    }
}

fn row_to_lead(row: &rusqlite::Row) -> rusqlite::Result<Lead> {
    let metadata_str: String = row.get(6)?;
    let metadata = serde_json::from_str(&metadata_str).unwrap_or_else(|_| serde_json::json!({}));
    let stage_str: String = row.get(4)?;
    Ok(Lead {
        lead_id: LeadId::from(row.get::<_, String>(0)?),
        phone: Phone(row.get(1)?),
        name: row.get(2)?,
        email: row.get(3)?,
        stage: stage_str.parse().unwrap_or(Stage::InitialContact),
        score: row.get(5)?,
        metadata,
        created_at: parse_dt(row.get::<_, String>(7)?),
        updated_at: parse_dt(row.get::<_, String>(8)?),
        external_crm_id: row.get(9)?,
    })
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        conversation_id: ConversationId::from(row.get::<_, String>(0)?),
        phone: Phone(row.get(1)?),
        lead_id: LeadId::from(row.get::<_, String>(2)?),
        last_message_at: parse_dt(row.get::<_, String>(3)?),
    })
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let direction_str: String = row.get(2)?;
    let media_type_str: String = row.get(4)?;
    Ok(Message {
        message_id: row.get(7)?,
        conversation_id: ConversationId::from(row.get::<_, String>(0)?),
        phone: Phone(row.get(1)?),
        direction: if direction_str == "outbound" {
            Direction::Outbound
        } else {
            Direction::Inbound
        },
        content: row.get(3)?,
        media_type: parse_media_type(&media_type_str),
        media_ref: row.get(5)?,
        timestamp: parse_dt(row.get::<_, String>(6)?),
    })
}

fn row_to_follow_up(row: &rusqlite::Row) -> rusqlite::Result<FollowUp> {
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let executed_at: Option<String> = row.get(8)?;
    Ok(FollowUp {
        follow_up_id: FollowUpId::from(row.get::<_, String>(0)?),
        lead_id: LeadId::from(row.get::<_, String>(1)?),
        kind: kind_str.parse().unwrap_or(FollowUpType::Reminder),
        scheduled_for: parse_dt(row.get::<_, String>(3)?),
        status: status_str.parse().unwrap_or(FollowUpStatus::Pending),
        attempt_number: row.get(5)?,
        message_override: row.get(6)?,
        created_at: parse_dt(row.get::<_, String>(7)?),
        executed_at: executed_at.map(parse_dt),
    })
}

fn parse_dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::types::{Direction as Dir, MediaType as Media};

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_or_update_lead_upserts_by_phone() {
        let s = store();
        let phone = Phone::parse("11988887777");
        let lead = Lead::new(phone.clone());
        let created = s.create_or_update_lead(&lead).unwrap();
        assert_eq!(created.phone, phone);

        let mut second = created.clone();
        second.name = Some("Maria".to_string());
        let updated = s.create_or_update_lead(&second).unwrap();
        assert_eq!(updated.lead_id, created.lead_id);
        assert_eq!(updated.name.as_deref(), Some("Maria"));
    }

    #[test]
    fn get_or_create_conversation_is_idempotent_per_phone() {
        let s = store();
        let phone = Phone::parse("11988887777");
        let lead = s.create_or_update_lead(&Lead::new(phone.clone())).unwrap();

        let first = s.get_or_create_conversation(&phone, &lead.lead_id).unwrap();
        let second = s.get_or_create_conversation(&phone, &lead.lead_id).unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);
    }

    #[test]
    fn insert_message_deduplicates_by_external_id() {
        let s = store();
        let phone = Phone::parse("11988887777");
        let lead = s.create_or_update_lead(&Lead::new(phone.clone())).unwrap();
        let conv = s.get_or_create_conversation(&phone, &lead.lead_id).unwrap();

        let msg = Message {
            message_id: "wa-1".to_string(),
            conversation_id: conv.conversation_id.clone(),
            phone: phone.clone(),
            direction: Dir::Inbound,
            content: "Oi".to_string(),
            media_type: Media::None,
            media_ref: None,
            timestamp: Utc::now(),
        };
        assert!(s.insert_message(&msg).unwrap());
        assert!(!s.insert_message(&msg).unwrap());

        let recent = s.get_recent_messages(&conv.conversation_id, 10).unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[test]
    fn has_pending_follow_up_reflects_status() {
        let s = store();
        let phone = Phone::parse("11988887777");
        let lead = s.create_or_update_lead(&Lead::new(phone)).unwrap();
        assert!(!s.has_pending_follow_up(&lead.lead_id).unwrap());

        let f = FollowUp {
            follow_up_id: FollowUpId::new(),
            lead_id: lead.lead_id.clone(),
            kind: FollowUpType::Reminder,
            scheduled_for: Utc::now(),
            status: FollowUpStatus::Pending,
            attempt_number: 1,
            message_override: None,
            created_at: Utc::now(),
            executed_at: None,
        };
        s.insert_follow_up(&f).unwrap();
        assert!(s.has_pending_follow_up(&lead.lead_id).unwrap());

        s.mark_follow_up(&f.follow_up_id, FollowUpStatus::Executed, Some(Utc::now()))
            .unwrap();
        assert!(!s.has_pending_follow_up(&lead.lead_id).unwrap());
    }
}
