//! The Follow-up Scheduler (§4.E): durable re-engagement timers that fire
//! into the conversation engine when a lead goes silent.
//!
//! `FollowUp` rows are the source of truth and live entirely behind
//! `sdr-store`; this crate owns only the execution loop — selecting due
//! rows, gating on business hours, composing and sending the nudge, and
//! chaining the next hop in the cadence.

pub mod business_hours;
pub mod engine;
pub mod error;
pub mod types;

pub use engine::{schedule_first_touch, FollowUpEngine};
pub use error::{FollowupError, Result};
pub use types::{FollowUpComposer, TemplateComposer};
