use std::sync::Arc;

use dashmap::DashMap;
use sdr_core::config::SessionConfig;
use sdr_core::types::{Lead, Phone};
use sdr_store::SqliteStore;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument};

use crate::analysis::{
    emotional_analysis, extract_entities, infer_stage, is_session_expired,
    is_session_over_duration, qualification_progress, should_use_reasoning,
};
use crate::error::Result;
use crate::types::{ContextBundle, CurrentMessage, Session, SessionState};

const RECENT_MESSAGE_LIMIT: usize = 100;

/// Owns the in-memory Session set and materializes the context bundle the
/// Agent Orchestrator consumes. Lead/Conversation/Message durability is
/// delegated entirely to `sdr-store`; this manager never persists a Session.
pub struct ContextManager {
    store: Arc<SqliteStore>,
    config: SessionConfig,
    sessions: DashMap<String, AsyncMutex<Session>>,
}

impl ContextManager {
    pub fn new(store: Arc<SqliteStore>, config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            store,
            config,
            sessions: DashMap::new(),
        })
    }

    /// Get-or-create/resume the session for `phone` (§4.C lifecycle).
    #[instrument(skip(self), fields(phone = %phone))]
    pub async fn get_or_create_session(&self, phone: &Phone) -> Result<Session> {
        let key = phone.as_str().to_string();
        let now = chrono::Utc::now();

        if let Some(entry) = self.sessions.get(&key) {
            let mut session = entry.lock().await;
            if self.is_valid(&session, now) {
                session.last_activity = now;
                return Ok(session.clone());
            }
        }

        let lead = self
            .store
            .get_lead_by_phone(phone)?
            .unwrap_or_else(|| Lead::new(phone.clone()));
        let lead = self.store.create_or_update_lead(&lead)?;

        let existing_conversation = self.store.get_conversation_by_phone(phone)?;
        let resumed = existing_conversation
            .as_ref()
            .map(|c| now - c.last_message_at < chrono::Duration::minutes(self.config.session_timeout_min))
            .unwrap_or(false);

        let conversation = self.store.get_or_create_conversation(phone, &lead.lead_id)?;

        let mut session = Session::new(phone.clone(), conversation.conversation_id.clone());
        if resumed {
            session.resumed_at = Some(now);
            debug!(phone = %phone, "resuming session from prior conversation activity");
        }

        self.sessions
            .insert(key, AsyncMutex::new(session.clone()));
        Ok(session)
    }

    fn is_valid(&self, session: &Session, now: chrono::DateTime<chrono::Utc>) -> bool {
        session.state == SessionState::Active
            && !is_session_expired(session.last_activity, now, &self.config)
            && !is_session_over_duration(session.created_at, now, &self.config)
            && session.message_count < self.config.max_messages_per_session
    }

    /// Materialize the full context bundle for one turn, and bump the
    /// session's message_count plus the store's Conversation.last_message_at.
    #[instrument(skip(self, current_message), fields(phone = %phone))]
    pub async fn build_context(
        &self,
        phone: &Phone,
        current_message: CurrentMessage,
    ) -> Result<ContextBundle> {
        let session = self.get_or_create_session(phone).await?;
        let lead = self
            .store
            .get_lead_by_phone(phone)?
            .unwrap_or_else(|| Lead::new(phone.clone()));
        let recent_messages = self
            .store
            .get_recent_messages(&session.conversation_id, RECENT_MESSAGE_LIMIT)?;

        let stage = infer_stage(&lead);
        let qualification = qualification_progress(&lead, &recent_messages, &self.config);
        let emotional_state = emotional_analysis(&recent_messages);
        let extracted = extract_entities(&recent_messages);
        let reasoning = should_use_reasoning(stage, &emotional_state, &recent_messages);

        let bundle = ContextBundle {
            current_message,
            lead,
            recent_messages,
            stage,
            qualification_progress: qualification,
            emotional_state,
            extracted,
            should_use_reasoning: reasoning,
        };

        self.touch(phone, &bundle).await?;
        Ok(bundle)
    }

    async fn touch(&self, phone: &Phone, bundle: &ContextBundle) -> Result<()> {
        let key = phone.as_str().to_string();
        if let Some(entry) = self.sessions.get(&key) {
            let mut session = entry.lock().await;
            session.message_count += 1;
            session.last_activity = chrono::Utc::now();
            session.context_snapshot = Some(bundle.clone());
        }
        self.store
            .update_conversation_last_message_at(phone, chrono::Utc::now())?;
        Ok(())
    }

    /// Explicit termination — e.g. a meeting got booked.
    pub async fn end_session(&self, phone: &Phone, state: SessionState) -> Result<()> {
        let key = phone.as_str().to_string();
        if let Some(entry) = self.sessions.get(&key) {
            let mut session = entry.lock().await;
            session.state = state;
        }
        Ok(())
    }

    /// Background sweep (every ≥60s per §4.C): ends sessions that fail
    /// validity and returns the phones that became abandoned, so the caller
    /// can enqueue a first-touch follow-up for each.
    pub async fn cleanup_sweep(&self) -> Vec<Phone> {
        let now = chrono::Utc::now();
        let mut abandoned = Vec::new();

        for entry in self.sessions.iter() {
            let mut session = entry.value().lock().await;
            if session.state != SessionState::Active {
                continue;
            }
            if is_session_over_duration(session.created_at, now, &self.config) {
                session.state = SessionState::Abandoned;
                abandoned.push(session.phone.clone());
            } else if is_session_expired(session.last_activity, now, &self.config) {
                session.state = SessionState::Expired;
                abandoned.push(session.phone.clone());
            }
        }

        if !abandoned.is_empty() {
            info!(count = abandoned.len(), "cleanup sweep expired/abandoned sessions");
        }
        abandoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::types::Phone;

    fn manager() -> Arc<ContextManager> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        ContextManager::new(store, SessionConfig::default())
    }

    #[tokio::test]
    async fn get_or_create_session_is_idempotent() {
        let mgr = manager();
        let phone = Phone::parse("11988887777");
        let first = mgr.get_or_create_session(&phone).await.unwrap();
        let second = mgr.get_or_create_session(&phone).await.unwrap();
        assert_eq!(first.conversation_id, second.conversation_id);
    }

    #[tokio::test]
    async fn build_context_increments_message_count() {
        let mgr = manager();
        let phone = Phone::parse("11988887777");
        mgr.get_or_create_session(&phone).await.unwrap();
        let msg = CurrentMessage {
            text: "Oi".to_string(),
            media_refs: vec![],
        };
        mgr.build_context(&phone, msg).await.unwrap();
        let session = mgr.get_or_create_session(&phone).await.unwrap();
        assert_eq!(session.message_count, 1);
    }
}
