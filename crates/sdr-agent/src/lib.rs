//! The Agent Orchestrator (§4.D): a tool-enabled LLM turn loop over a
//! `ContextBundle`, plus the collaborator traits (`CrmClient`,
//! `CalendarClient`, `MediaAnalyzer`) and concrete HTTP/LLM-backed
//! implementations `sdr-gateway` wires at startup.

pub mod anthropic;
pub mod error;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod thinking;
pub mod tools;

pub use anthropic::AnthropicProvider;
pub use error::AgentError;
pub use pipeline::{process_turn, ProcessedMessage};
pub use prompt::{PromptBuilder, SystemPrompt};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError};
pub use thinking::ThinkingLevel;
pub use tools::{IdempotencyClass, Tool, ToolResult};
