//! Per-phone inbound message coalescing (§4.B of the engine design):
//! debounces rapid-fire WhatsApp messages into a single turn, drops
//! redeliveries, and hands off with at most one turn in flight per phone.

pub mod coalescer;
pub mod error;

pub use coalescer::{BufferConfig, CoalescedTurn, MessageBuffer, TurnSink};
pub use error::{BufferError, Result};
