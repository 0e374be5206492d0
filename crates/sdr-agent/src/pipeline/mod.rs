//! The Agent Orchestrator's turn pipeline (§4.D).

pub mod process;

pub use process::{process_turn, ProcessedMessage};
