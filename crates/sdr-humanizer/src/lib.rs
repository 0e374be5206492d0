//! Humanized outbound delivery (§4.A): chunk an agent reply at natural
//! break points, pace it with typing-indicator delays, and drive the send
//! loop against whatever implements `OutboundGateway`.

pub mod break_patterns;
pub mod chunk;
pub mod error;
pub mod humanizer;

pub use error::{HumanizerError, Result};
pub use humanizer::{ChunkOp, ChunkPlan, Humanizer, MediaGateway, OutboundGateway};
