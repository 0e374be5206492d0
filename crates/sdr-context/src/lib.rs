//! Session & Context Manager (§4.C): owns the ephemeral in-memory Session
//! set and derives the context bundle — stage, qualification, emotional
//! read, extracted entities, reasoning toggle — that the Agent Orchestrator
//! runs a turn against.

pub mod analysis;
pub mod error;
pub mod manager;
pub mod types;

pub use error::{ContextError, Result};
pub use manager::ContextManager;
pub use types::{ContextBundle, CurrentMessage, Session, SessionState};
