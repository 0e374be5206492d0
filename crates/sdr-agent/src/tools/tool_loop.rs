//! Tool execution loop — the core agentic behavior (§4.D).
//!
//! Flow: prompt → LLM → if tool_use → execute tools → inject results → LLM → repeat.
//! Stops when: stop_reason is not "tool_use", `max_hops` is reached, or an error.
//!
//! Per-call retry/dedup policy is driven by each tool's `IdempotencyClass`:
//! - `SafeRetry`: retried on a retryable failure with exponential backoff, and
//!   fanned out concurrently with sibling `SafeRetry` calls in the same turn.
//! - `UniqueByKey`: run once; the tool itself upgrades create-to-update on
//!   conflict, so the loop never retries it.
//! - `SideEffectOnce`: run once per distinct (tool, input) fingerprint within
//!   a short window, so a duplicated tool_use block can't double-send.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use rand::Rng;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::provider::{ChatRequest, ChatResponse, LlmProvider, ProviderError, ToolCall};

use super::{IdempotencyClass, Tool, ToolResult};

const SIDE_EFFECT_DEDUP_TTL: Duration = Duration::from_secs(300);
const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_secs(1);
const RETRY_CAP: Duration = Duration::from_secs(10);

/// Short-lived fingerprint cache guarding `SideEffectOnce` tools against
/// re-execution when the same call appears twice within the TTL window
/// (e.g. a retried turn that replays an already-applied tool_use block).
struct DedupCache {
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    fn new() -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `fingerprint` was already seen within the TTL
    /// (i.e. this call should be treated as a duplicate), recording it
    /// either way.
    fn seen_recently(&self, fingerprint: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().expect("dedup cache lock poisoned");
        seen.retain(|_, at| now.duration_since(*at) < SIDE_EFFECT_DEDUP_TTL);
        if seen.contains_key(fingerprint) {
            true
        } else {
            seen.insert(fingerprint.to_string(), now);
            false
        }
    }
}

fn fingerprint(call: &ToolCall) -> String {
    let mut hasher = Sha256::new();
    hasher.update(call.name.as_bytes());
    hasher.update(b":");
    hasher.update(call.input.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Run the full tool execution loop (non-streaming).
///
/// Starts from `initial_request`, which must have `messages` or `raw_messages`
/// set. Runs at most `max_hops` round trips to the provider (sourced from
/// `AgentConfig::max_tool_hops`). Returns the final `ChatResponse` (the one
/// with `stop_reason != "tool_use"`).
pub async fn run_tool_loop(
    provider: &dyn LlmProvider,
    initial_request: ChatRequest,
    tools: &[Box<dyn Tool>],
    max_hops: usize,
) -> Result<ChatResponse, ProviderError> {
    let mut raw_messages: Vec<serde_json::Value> =
        if let Some(ref raw) = initial_request.raw_messages {
            raw.clone()
        } else {
            initial_request
                .messages
                .iter()
                .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
                .collect()
        };

    let dedup = DedupCache::new();
    let mut last_response: Option<ChatResponse> = None;

    for hop in 0..max_hops {
        let mut req = initial_request.clone();
        req.raw_messages = Some(raw_messages.clone());

        debug!(hop, "tool loop iteration");

        let response = provider.send(&req).await?;

        if response.tool_calls.is_empty() || response.stop_reason != "tool_use" {
            info!(hop, "tool loop complete — no more tool calls");
            return Ok(response);
        }

        let mut assistant_content: Vec<serde_json::Value> = Vec::new();
        if !response.content.is_empty() {
            assistant_content.push(serde_json::json!({
                "type": "text",
                "text": response.content,
            }));
        }
        for call in &response.tool_calls {
            assistant_content.push(serde_json::json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.input,
            }));
        }
        raw_messages.push(serde_json::json!({
            "role": "assistant",
            "content": assistant_content,
        }));

        let results = execute_calls(tools, &response.tool_calls, &dedup).await;

        let tool_result_content: Vec<serde_json::Value> = response
            .tool_calls
            .iter()
            .zip(results.iter())
            .map(|(call, result)| {
                serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": call.id,
                    "content": result.content,
                    "is_error": result.is_error,
                })
            })
            .collect();

        raw_messages.push(serde_json::json!({
            "role": "user",
            "content": tool_result_content,
        }));

        last_response = Some(response);
    }

    warn!(max_hops, "tool loop hit maximum hops");

    if let Some(resp) = last_response {
        Ok(resp)
    } else {
        Err(ProviderError::Parse(format!(
            "tool loop exceeded {max_hops} hops without a final response"
        )))
    }
}

/// Execute one turn's tool calls, honoring each tool's idempotency class.
/// When every call in the turn targets a `SafeRetry` tool, they fan out
/// concurrently (§4.D "Parallelism"); otherwise they run in call order so
/// that side-effecting and unique-by-key tools never race each other.
async fn execute_calls(
    tools: &[Box<dyn Tool>],
    calls: &[ToolCall],
    dedup: &DedupCache,
) -> Vec<ToolResult> {
    let all_safe_retry = !calls.is_empty()
        && calls
            .iter()
            .all(|c| lookup(tools, &c.name).map(|t| t.idempotency()) == Some(IdempotencyClass::SafeRetry));

    if all_safe_retry {
        join_all(calls.iter().map(|call| execute_one(tools, call, dedup))).await
    } else {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(execute_one(tools, call, dedup).await);
        }
        results
    }
}

fn lookup<'a>(tools: &'a [Box<dyn Tool>], name: &str) -> Option<&'a dyn Tool> {
    tools.iter().find(|t| t.name() == name).map(|t| t.as_ref())
}

/// Execute a single tool call under its idempotency class's policy.
async fn execute_one(tools: &[Box<dyn Tool>], call: &ToolCall, dedup: &DedupCache) -> ToolResult {
    let Some(tool) = lookup(tools, &call.name) else {
        return ToolResult::error(format!("unknown tool: {}", call.name));
    };

    match tool.idempotency() {
        IdempotencyClass::SideEffectOnce => {
            if dedup.seen_recently(&fingerprint(call)) {
                debug!(tool = %call.name, "deduped repeated side-effecting call");
                return ToolResult::success("duplicate call ignored (already applied)");
            }
            tool.execute(call.input.clone()).await
        }
        IdempotencyClass::UniqueByKey => tool.execute(call.input.clone()).await,
        IdempotencyClass::SafeRetry => execute_with_retry(tool, call).await,
    }
}

/// Exponential backoff with jitter for `SafeRetry` tools, per §4.D: base 1s,
/// factor 2, ±50% jitter, capped at 10s, up to 3 attempts.
async fn execute_with_retry(tool: &dyn Tool, call: &ToolCall) -> ToolResult {
    let mut attempt = 0;
    loop {
        let result = tool.execute(call.input.clone()).await;
        if !result.is_error || !result.retryable || attempt + 1 >= RETRY_MAX_ATTEMPTS {
            return result;
        }
        let delay = backoff_delay(attempt);
        warn!(
            tool = %call.name,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retrying tool call after transient failure"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = RETRY_BASE.as_millis() as u64 * 2u64.saturating_pow(attempt);
    let capped_ms = base_ms.min(RETRY_CAP.as_millis() as u64);
    let jitter = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_millis((capped_ms as f64 * jitter) as u64)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::provider::{Message, Role};

    struct CountingTool {
        name: &'static str,
        idempotency: IdempotencyClass,
        calls: Arc<AtomicUsize>,
        fail_times: usize,
        retryable: bool,
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "test tool"
        }
        fn input_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }
        fn idempotency(&self) -> IdempotencyClass {
            self.idempotency
        }
        async fn execute(&self, _input: serde_json::Value) -> ToolResult {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                if self.retryable {
                    ToolResult::retryable_error("transient")
                } else {
                    ToolResult::error("permanent")
                }
            } else {
                ToolResult::success("ok")
            }
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: format!("call-{name}"),
            name: name.to_string(),
            input: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn safe_retry_recovers_from_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool: Box<dyn Tool> = Box::new(CountingTool {
            name: "flaky",
            idempotency: IdempotencyClass::SafeRetry,
            calls: calls.clone(),
            fail_times: 2,
            retryable: true,
        });
        let tools = vec![tool];
        let dedup = DedupCache::new();
        let result = execute_one(&tools, &call("flaky"), &dedup).await;
        assert!(!result.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn safe_retry_gives_up_on_non_retryable_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool: Box<dyn Tool> = Box::new(CountingTool {
            name: "broken",
            idempotency: IdempotencyClass::SafeRetry,
            calls: calls.clone(),
            fail_times: 10,
            retryable: false,
        });
        let tools = vec![tool];
        let dedup = DedupCache::new();
        let result = execute_one(&tools, &call("broken"), &dedup).await;
        assert!(result.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn side_effect_once_dedups_repeated_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let tool: Box<dyn Tool> = Box::new(CountingTool {
            name: "send_text",
            idempotency: IdempotencyClass::SideEffectOnce,
            calls: calls.clone(),
            fail_times: 0,
            retryable: false,
        });
        let tools = vec![tool];
        let dedup = DedupCache::new();
        let c = call("send_text");
        let first = execute_one(&tools, &c, &dedup).await;
        let second = execute_one(&tools, &c, &dedup).await;
        assert!(!first.is_error);
        assert!(!second.is_error);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(second.content.contains("duplicate"));
    }

    #[tokio::test]
    async fn unknown_tool_reports_error() {
        let tools: Vec<Box<dyn Tool>> = vec![];
        let dedup = DedupCache::new();
        let result = execute_one(&tools, &call("ghost"), &dedup).await;
        assert!(result.is_error);
        assert!(result.content.contains("unknown tool"));
    }

    struct EchoProvider;

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }
        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: "done".to_string(),
                model: "test".to_string(),
                tokens_in: 1,
                tokens_out: 1,
                stop_reason: "end_turn".to_string(),
                tool_calls: vec![],
            })
        }
    }

    #[tokio::test]
    async fn loop_returns_immediately_when_no_tool_calls() {
        let req = ChatRequest {
            model: "test".to_string(),
            system: String::new(),
            system_prompt: None,
            messages: vec![Message {
                role: Role::User,
                content: "hi".to_string(),
            }],
            max_tokens: 100,
            thinking: None,
            tools: vec![],
            raw_messages: None,
        };
        let tools: Vec<Box<dyn Tool>> = vec![];
        let response = run_tool_loop(&EchoProvider, req, &tools, 8).await.unwrap();
        assert_eq!(response.content, "done");
    }
}
