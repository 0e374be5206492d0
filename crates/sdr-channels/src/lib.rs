//! The WhatsApp channel adapter: outbound send/typing/media over the
//! gateway's JSON-over-HTTP contract, and vendor-envelope normalization
//! for inbound events (§4.F, §6).

pub mod channel;
pub mod error;
pub mod types;
pub mod whatsapp;

pub use channel::Channel;
pub use error::{ChannelError, Result};
pub use types::{NormalizedMessage, WebhookEnvelope};
pub use whatsapp::{normalize_event, WhatsAppChannel};
