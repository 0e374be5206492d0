//! Per-phone message coalescing: batches rapid-fire inbound messages into a
//! single turn, debounced by a fixed window, with bounded dedup and a
//! per-phone pending cap. Grounded on the keyed-concurrent-map shape the
//! gateway already uses for its client registries (`DashMap`), generalized
//! here into a debounce-and-single-flight primitive per phone.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sdr_core::types::{Message, Phone};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

/// Receives a drained turn once the coalescing window closes.
#[async_trait]
pub trait TurnSink: Send + Sync {
    async fn handle_turn(&self, turn: CoalescedTurn);
}

/// One or more inbound messages from the same phone, collapsed into a single
/// unit of work for the Session/Context Manager and Agent Orchestrator.
#[derive(Debug, Clone)]
pub struct CoalescedTurn {
    pub phone: Phone,
    pub messages: Vec<Message>,
    pub combined_text: String,
    pub started_at: DateTime<Utc>,
    pub flushed_at: DateTime<Utc>,
}

impl CoalescedTurn {
    fn from_messages(phone: Phone, messages: Vec<Message>) -> Self {
        let started_at = messages
            .first()
            .map(|m| m.timestamp)
            .unwrap_or_else(Utc::now);
        let combined_text = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        Self {
            phone,
            messages,
            combined_text,
            started_at,
            flushed_at: Utc::now(),
        }
    }
}

#[derive(Default)]
struct PendingTurn {
    messages: Vec<Message>,
    generation: u64,
    in_flight: bool,
}

/// Bounded, insertion-ordered set of recently seen message ids. Used to drop
/// at-least-once redeliveries before they ever reach a turn.
struct Dedup {
    capacity: usize,
    order: VecDeque<String>,
    set: HashSet<String>,
}

impl Dedup {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `true` if `id` was already seen (and leaves it unrecorded
    /// again); otherwise records it and returns `false`.
    fn seen_or_record(&mut self, id: &str) -> bool {
        if self.set.contains(id) {
            return true;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.set.insert(id.to_string());
        false
    }
}

pub struct BufferConfig {
    pub window_ms: u64,
    pub per_phone_cap: usize,
    pub dedup_capacity: usize,
}

impl From<&sdr_core::config::BufferConfig> for BufferConfig {
    fn from(c: &sdr_core::config::BufferConfig) -> Self {
        Self {
            window_ms: c.buffer_window_ms,
            per_phone_cap: c.per_phone_cap,
            dedup_capacity: c.dedup_capacity,
        }
    }
}

/// Debounces inbound messages per phone and hands coalesced turns to a
/// `TurnSink` with at most one turn in flight per phone at a time.
pub struct MessageBuffer<S: TurnSink + 'static> {
    config: BufferConfig,
    pending: DashMap<String, AsyncMutex<PendingTurn>>,
    dedup: AsyncMutex<Dedup>,
    sink: Arc<S>,
}

impl<S: TurnSink + 'static> MessageBuffer<S> {
    pub fn new(config: BufferConfig, sink: Arc<S>) -> Arc<Self> {
        let dedup = Dedup::new(config.dedup_capacity);
        Arc::new(Self {
            config,
            pending: DashMap::new(),
            dedup: AsyncMutex::new(dedup),
            sink,
        })
    }

    /// Ingest a single inbound message. Debounces for `window_ms`; if another
    /// message lands for the same phone before the window closes, the timer
    /// effectively restarts (the stale-generation check in `try_drain` makes
    /// the earlier timer a no-op).
    pub async fn ingest(self: &Arc<Self>, msg: Message) {
        if self.dedup.lock().await.seen_or_record(&msg.message_id) {
            debug!(external_id = %msg.message_id, "duplicate inbound message dropped");
            return;
        }

        let key = msg.phone.as_str().to_string();
        let generation = {
            let entry = self
                .pending
                .entry(key.clone())
                .or_insert_with(|| AsyncMutex::new(PendingTurn::default()));
            let mut pt = entry.lock().await;
            if pt.messages.len() >= self.config.per_phone_cap {
                warn!(phone = %msg.phone, cap = self.config.per_phone_cap, "pending cap reached, dropping oldest message");
                pt.messages.remove(0);
            }
            pt.messages.push(msg.clone());
            pt.generation += 1;
            pt.generation
        };

        self.schedule_drain(msg.phone, generation);
    }

    fn schedule_drain(self: &Arc<Self>, phone: Phone, generation: u64) {
        let this = Arc::clone(self);
        let window = Duration::from_millis(this.config.window_ms);
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            this.try_drain(phone, generation).await;
        });
    }

    async fn try_drain(self: &Arc<Self>, phone: Phone, generation: u64) {
        let key = phone.as_str().to_string();
        let turn = {
            let entry = match self.pending.get(&key) {
                Some(e) => e,
                None => return,
            };
            let mut pt = entry.lock().await;
            if pt.generation != generation || pt.in_flight || pt.messages.is_empty() {
                // A newer message reset the window, or a drain is already
                // running — the still-pending timer for that generation
                // will flush instead.
                return;
            }
            pt.in_flight = true;
            let messages = std::mem::take(&mut pt.messages);
            CoalescedTurn::from_messages(phone.clone(), messages)
        };

        self.sink.handle_turn(turn).await;

        let mut requeue = None;
        if let Some(entry) = self.pending.get(&key) {
            let mut pt = entry.lock().await;
            pt.in_flight = false;
            if !pt.messages.is_empty() {
                requeue = Some(pt.generation);
            }
        }
        if let Some(generation) = requeue {
            self.schedule_drain(phone, generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdr_core::types::{Direction, MediaType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingSink {
        turns: AtomicUsize,
        messages: AtomicUsize,
        notify: Notify,
    }

    #[async_trait]
    impl TurnSink for CountingSink {
        async fn handle_turn(&self, turn: CoalescedTurn) {
            self.turns.fetch_add(1, Ordering::SeqCst);
            self.messages.fetch_add(turn.messages.len(), Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    fn msg(phone: &Phone, id: &str, text: &str) -> Message {
        Message {
            message_id: id.to_string(),
            conversation_id: sdr_core::types::ConversationId::new(),
            phone: phone.clone(),
            direction: Direction::Inbound,
            content: text.to_string(),
            media_type: MediaType::None,
            media_ref: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn coalesces_rapid_messages_into_one_turn() {
        let sink = Arc::new(CountingSink {
            turns: AtomicUsize::new(0),
            messages: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let buf = MessageBuffer::new(
            BufferConfig {
                window_ms: 50,
                per_phone_cap: 20,
                dedup_capacity: 1000,
            },
            Arc::clone(&sink),
        );
        let phone = Phone::parse("11988887777");
        buf.ingest(msg(&phone, "m1", "oi")).await;
        buf.ingest(msg(&phone, "m2", "tudo bem?")).await;

        sink.notify.notified().await;
        assert_eq!(sink.turns.load(Ordering::SeqCst), 1);
        assert_eq!(sink.messages.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn duplicate_external_id_is_dropped() {
        let sink = Arc::new(CountingSink {
            turns: AtomicUsize::new(0),
            messages: AtomicUsize::new(0),
            notify: Notify::new(),
        });
        let buf = MessageBuffer::new(
            BufferConfig {
                window_ms: 20,
                per_phone_cap: 20,
                dedup_capacity: 1000,
            },
            Arc::clone(&sink),
        );
        let phone = Phone::parse("11988887777");
        buf.ingest(msg(&phone, "dup", "oi")).await;
        buf.ingest(msg(&phone, "dup", "oi")).await;

        sink.notify.notified().await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(sink.turns.load(Ordering::SeqCst), 1);
        assert_eq!(sink.messages.load(Ordering::SeqCst), 1);
    }
}
