//! SQLite persistence for leads, conversations, messages, and follow-ups.
//!
//! `sdr-store` is the only crate that touches `rusqlite` directly. Sessions
//! are deliberately absent here — they are ephemeral, in-memory state owned
//! by `sdr-context`, never written to disk.

pub mod db;
pub mod error;
pub mod store;

pub use error::{Result, StoreError};
pub use store::SqliteStore;
