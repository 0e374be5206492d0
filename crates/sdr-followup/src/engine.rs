//! The Follow-up Scheduler's execution loop (§4.E): a single worker that
//! wakes periodically, fires due timers through the outbound humanizer, and
//! schedules the next hop in the cadence.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sdr_core::config::FollowUpConfig;
use sdr_core::types::{EmotionalState, FollowUp, FollowUpId, FollowUpStatus, FollowUpType, Lead, LeadId, Stage};
use sdr_humanizer::{Humanizer, OutboundGateway};
use sdr_store::SqliteStore;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::business_hours::{is_business_hours, next_window_start};
use crate::error::{FollowupError, Result};
use crate::types::FollowUpComposer;

/// How often the worker polls the store for due rows. Wakes at least every
/// 60s so a due follow-up never sits much past its scheduled time.
const WAKE_INTERVAL: Duration = Duration::from_secs(60);

/// Stages past which automated follow-up nudges no longer make sense: a
/// meeting is already on the calendar (`Scheduling`) or the lead has been
/// handed off as qualified (`Qualified`) — see DESIGN.md for how this maps
/// onto the `Stage` enum.
fn should_skip(stage: Stage) -> bool {
    matches!(stage, Stage::Scheduling | Stage::Qualified)
}

pub struct FollowUpEngine<C: FollowUpComposer> {
    store: Arc<SqliteStore>,
    humanizer: Arc<Humanizer>,
    gateway: Arc<dyn OutboundGateway>,
    composer: Arc<C>,
    config: FollowUpConfig,
}

impl<C: FollowUpComposer> FollowUpEngine<C> {
    pub fn new(
        store: Arc<SqliteStore>,
        humanizer: Arc<Humanizer>,
        gateway: Arc<dyn OutboundGateway>,
        composer: Arc<C>,
        config: FollowUpConfig,
    ) -> Self {
        Self {
            store,
            humanizer,
            gateway,
            composer,
            config,
        }
    }

    /// Run until `shutdown` reports `true`. Intended to be spawned as a
    /// background task alongside the webhook server.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(WAKE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "follow-up tick failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("follow-up engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One polling pass: select due rows and process each independently so
    /// that one failure doesn't block the rest of the batch.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let due = self.store.get_due_follow_ups(now)?;
        for follow_up in due {
            let id = follow_up.follow_up_id.clone();
            if let Err(e) = self.process_one(follow_up, now).await {
                warn!(follow_up_id = %id, error = %e, "follow-up processing failed");
            }
        }
        Ok(())
    }

    async fn process_one(&self, follow_up: FollowUp, now: DateTime<Utc>) -> Result<()> {
        let lead = self
            .store
            .get_lead(&follow_up.lead_id)?
            .ok_or(FollowupError::LeadNotFound)?;

        if should_skip(lead.stage) {
            self.store
                .mark_follow_up(&follow_up.follow_up_id, FollowUpStatus::Skipped, None)?;
            return Ok(());
        }

        if !is_business_hours(&self.config, now) {
            let next = next_window_start(&self.config, now);
            self.store
                .reschedule_follow_up(&follow_up.follow_up_id, next)?;
            return Ok(());
        }

        let text = match &follow_up.message_override {
            Some(text) => text.clone(),
            None => self
                .composer
                .compose(&lead, follow_up.kind)
                .await
                .map_err(|e| FollowupError::Compose(e.to_string()))?,
        };

        match self.send(&lead, &text).await {
            Ok(()) => {
                self.store.mark_follow_up(
                    &follow_up.follow_up_id,
                    FollowUpStatus::Executed,
                    Some(now),
                )?;
                self.schedule_next_hop(&follow_up, now)?;
                Ok(())
            }
            Err(e) => {
                self.store
                    .mark_follow_up(&follow_up.follow_up_id, FollowUpStatus::Failed, None)?;
                Err(e)
            }
        }
    }

    /// Deliver via the outbound humanizer with a neutral emotional state
    /// (§4.E step 4 — nudges carry no conversational emotional read).
    async fn send(&self, lead: &Lead, text: &str) -> Result<()> {
        let neutral = EmotionalState::default();
        let plan = self.humanizer.plan(text, &neutral, false);
        self.humanizer
            .execute(&plan, &lead.phone, self.gateway.as_ref())
            .await?;
        Ok(())
    }

    fn schedule_next_hop(&self, follow_up: &FollowUp, now: DateTime<Utc>) -> Result<()> {
        let Some(next_kind) = follow_up.kind.next_hop() else {
            return Ok(());
        };
        if self.store.has_pending_follow_up(&follow_up.lead_id)? {
            return Ok(());
        }
        let next = FollowUp {
            follow_up_id: FollowUpId::new(),
            lead_id: follow_up.lead_id.clone(),
            kind: next_kind,
            scheduled_for: now + next_kind.delay(),
            status: FollowUpStatus::Pending,
            attempt_number: follow_up.attempt_number + 1,
            message_override: None,
            created_at: now,
            executed_at: None,
        };
        self.store.insert_follow_up(&next)?;
        Ok(())
    }
}

/// Schedule the very first follow-up for a lead that just went silent
/// (abandonment, §4.E "schedules a first-touch follow-up immediately with a
/// +30 min delay"). Called by `sdr-context`'s cleanup sweep when a session
/// transitions to abandoned.
pub fn schedule_first_touch(store: &SqliteStore, lead_id: &LeadId) -> Result<()> {
    if store.has_pending_follow_up(lead_id)? {
        return Ok(());
    }
    let now = Utc::now();
    let follow_up = FollowUp {
        follow_up_id: FollowUpId::new(),
        lead_id: lead_id.clone(),
        kind: FollowUpType::Reminder,
        scheduled_for: now + FollowUpType::Reminder.delay(),
        status: FollowUpStatus::Pending,
        attempt_number: 1,
        message_override: None,
        created_at: now,
        executed_at: None,
    };
    store.insert_follow_up(&follow_up)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdr_core::config::HumanizerConfig;
    use sdr_core::types::{Phone, Stage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingGateway {
        sent: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl OutboundGateway for RecordingGateway {
        async fn send_text(&self, _phone: &Phone, text: &str) -> sdr_humanizer::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            Ok(())
        }
        async fn send_typing(&self, _phone: &Phone, _on: bool) -> sdr_humanizer::Result<()> {
            Ok(())
        }
    }

    struct CountingComposer {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl FollowUpComposer for CountingComposer {
        async fn compose(&self, _lead: &Lead, _kind: FollowUpType) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("oi, tudo bem?".to_string())
        }
    }

    fn business_hours_config() -> FollowUpConfig {
        FollowUpConfig {
            followup_first_delay_min: 30,
            followup_second_delay_h: 24,
            business_hours_start: "00:00".to_string(),
            business_hours_end: "23:59".to_string(),
            business_tz: "UTC".to_string(),
        }
    }

    fn engine(store: Arc<SqliteStore>, gateway: Arc<RecordingGateway>) -> FollowUpEngine<CountingComposer> {
        FollowUpEngine::new(
            store,
            Arc::new(Humanizer::new(HumanizerConfig::default())),
            gateway,
            Arc::new(CountingComposer {
                calls: AtomicUsize::new(0),
            }),
            business_hours_config(),
        )
    }

    #[tokio::test]
    async fn executed_follow_up_schedules_next_hop() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let phone = Phone::parse("5511988887777").unwrap();
        let lead = store
            .create_or_update_lead(&Lead::new(phone.clone()))
            .unwrap();

        let fu = FollowUp {
            follow_up_id: FollowUpId::new(),
            lead_id: lead.lead_id.clone(),
            kind: FollowUpType::Reminder,
            scheduled_for: Utc::now() - chrono::Duration::minutes(1),
            status: FollowUpStatus::Pending,
            attempt_number: 1,
            message_override: None,
            created_at: Utc::now(),
            executed_at: None,
        };
        store.insert_follow_up(&fu).unwrap();

        let gateway = Arc::new(RecordingGateway {
            sent: StdMutex::new(Vec::new()),
        });
        let eng = engine(store.clone(), gateway.clone());
        eng.tick().await.unwrap();

        assert!(!gateway.sent.lock().unwrap().is_empty());
        assert!(!store.get_due_follow_ups(Utc::now() + chrono::Duration::hours(25)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn skips_when_stage_past_follow_up_relevance() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let phone = Phone::parse("5511988887777").unwrap();
        let mut lead = Lead::new(phone.clone());
        lead.stage = Stage::Qualified;
        let lead = store.create_or_update_lead(&lead).unwrap();

        let fu = FollowUp {
            follow_up_id: FollowUpId::new(),
            lead_id: lead.lead_id.clone(),
            kind: FollowUpType::Reminder,
            scheduled_for: Utc::now() - chrono::Duration::minutes(1),
            status: FollowUpStatus::Pending,
            attempt_number: 1,
            message_override: None,
            created_at: Utc::now(),
            executed_at: None,
        };
        store.insert_follow_up(&fu).unwrap();

        let gateway = Arc::new(RecordingGateway {
            sent: StdMutex::new(Vec::new()),
        });
        let eng = engine(store.clone(), gateway.clone());
        eng.tick().await.unwrap();

        assert!(gateway.sent.lock().unwrap().is_empty());
    }
}
