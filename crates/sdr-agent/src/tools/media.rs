//! Media analysis tools: leads send photos of their energy bill, voice
//! notes, and PDFs. Analysis is delegated to the same LLM collaborator
//! that drives the conversation (`LlmProvider`) over its single-call
//! `send()` path — no separate vision/ASR provider is wired in.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::provider::{ChatRequest, LlmProvider, Message as ProviderMessage, Role};
use super::{IdempotencyClass, Tool, ToolResult};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("provider error: {0}")]
    Provider(#[from] crate::provider::ProviderError),
    #[error("unsupported media reference: {0}")]
    Unsupported(String),
}

impl MediaError {
    pub fn is_retryable(&self) -> bool {
        match self {
            MediaError::Provider(e) => e.is_retryable(),
            MediaError::Unsupported(_) => false,
        }
    }
}

fn media_result(e: MediaError) -> ToolResult {
    if e.is_retryable() {
        ToolResult::retryable_error(e.to_string())
    } else {
        ToolResult::error(e.to_string())
    }
}

/// Media analysis as an external collaborator. The concrete implementation
/// (`LlmMediaAnalyzer`) reuses the conversation's `LlmProvider`.
#[async_trait]
pub trait MediaAnalyzer: Send + Sync {
    async fn analyze_image(&self, media_ref: &str) -> Result<String, MediaError>;
    async fn transcribe_audio(&self, media_ref: &str) -> Result<String, MediaError>;
    async fn extract_document_text(&self, media_ref: &str) -> Result<String, MediaError>;
}

pub struct LlmMediaAnalyzer {
    provider: Arc<dyn LlmProvider>,
    model: String,
}

impl LlmMediaAnalyzer {
    pub fn new(provider: Arc<dyn LlmProvider>, model: String) -> Self {
        Self { provider, model }
    }

    async fn ask(&self, instruction: &str, media_ref: &str) -> Result<String, MediaError> {
        let req = ChatRequest {
            model: self.model.clone(),
            system: "You analyze a single piece of media referenced by an opaque id and describe it concisely in Portuguese.".to_string(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: format!("{instruction}\n\nmedia_ref: {media_ref}"),
            }],
            max_tokens: 512,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };
        let resp = self.provider.send(&req).await?;
        Ok(resp.content)
    }
}

#[async_trait]
impl MediaAnalyzer for LlmMediaAnalyzer {
    async fn analyze_image(&self, media_ref: &str) -> Result<String, MediaError> {
        self.ask(
            "Describe what this image shows. If it looks like an electricity bill, extract the monthly amount due and the billing address if visible.",
            media_ref,
        )
        .await
    }

    async fn transcribe_audio(&self, media_ref: &str) -> Result<String, MediaError> {
        self.ask("Transcribe this voice note verbatim.", media_ref).await
    }

    async fn extract_document_text(&self, media_ref: &str) -> Result<String, MediaError> {
        self.ask("Extract the text content of this document.", media_ref).await
    }
}

pub struct AnalyzeImageTool {
    analyzer: Arc<dyn MediaAnalyzer>,
}

impl AnalyzeImageTool {
    pub fn new(analyzer: Arc<dyn MediaAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[derive(Deserialize)]
struct MediaRefInput {
    media_ref: String,
}

#[async_trait]
impl Tool for AnalyzeImageTool {
    fn name(&self) -> &str {
        "analyze_image"
    }

    fn description(&self) -> &str {
        "Describe the contents of an inbound image, e.g. a photo of an energy bill."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "media_ref": { "type": "string" } },
            "required": ["media_ref"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: MediaRefInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.analyzer.analyze_image(&input.media_ref).await {
            Ok(text) => ToolResult::success(text),
            Err(e) => media_result(e),
        }
    }
}

pub struct TranscribeAudioTool {
    analyzer: Arc<dyn MediaAnalyzer>,
}

impl TranscribeAudioTool {
    pub fn new(analyzer: Arc<dyn MediaAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Tool for TranscribeAudioTool {
    fn name(&self) -> &str {
        "transcribe_audio"
    }

    fn description(&self) -> &str {
        "Transcribe an inbound voice note to text."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "media_ref": { "type": "string" } },
            "required": ["media_ref"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: MediaRefInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.analyzer.transcribe_audio(&input.media_ref).await {
            Ok(text) => ToolResult::success(text),
            Err(e) => media_result(e),
        }
    }
}

pub struct ExtractDocumentTextTool {
    analyzer: Arc<dyn MediaAnalyzer>,
}

impl ExtractDocumentTextTool {
    pub fn new(analyzer: Arc<dyn MediaAnalyzer>) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl Tool for ExtractDocumentTextTool {
    fn name(&self) -> &str {
        "extract_document_text"
    }

    fn description(&self) -> &str {
        "Extract the text content of an inbound document (e.g. a PDF bill)."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "media_ref": { "type": "string" } },
            "required": ["media_ref"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: MediaRefInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.analyzer.extract_document_text(&input.media_ref).await {
            Ok(text) => ToolResult::success(text),
            Err(e) => media_result(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeAnalyzer;

    #[async_trait]
    impl MediaAnalyzer for FakeAnalyzer {
        async fn analyze_image(&self, media_ref: &str) -> Result<String, MediaError> {
            Ok(format!("image description for {media_ref}"))
        }
        async fn transcribe_audio(&self, _media_ref: &str) -> Result<String, MediaError> {
            Ok("transcript".to_string())
        }
        async fn extract_document_text(&self, _media_ref: &str) -> Result<String, MediaError> {
            Ok("document text".to_string())
        }
    }

    #[tokio::test]
    async fn analyze_image_returns_description() {
        let tool = AnalyzeImageTool::new(Arc::new(FakeAnalyzer));
        let result = tool.execute(serde_json::json!({ "media_ref": "abc123" })).await;
        assert!(!result.is_error);
        assert!(result.content.contains("abc123"));
    }
}
