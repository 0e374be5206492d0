//! Utility tools (§4.D): small pure helpers with no external collaborator.

use async_trait::async_trait;
use sdr_core::types::Phone;
use serde::Deserialize;

use super::{IdempotencyClass, Tool, ToolResult};

pub struct ValidatePhoneTool;

#[derive(Deserialize)]
struct ValidatePhoneInput {
    phone: String,
}

#[async_trait]
impl Tool for ValidatePhoneTool {
    fn name(&self) -> &str {
        "validate_phone"
    }

    fn description(&self) -> &str {
        "Validate and canonicalize a phone number to the WhatsApp-ready digits-only form."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "phone": { "type": "string" } },
            "required": ["phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: ValidatePhoneInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        let canonical = Phone::parse(&input.phone);
        if canonical.as_str().len() < 10 {
            return ToolResult::error("phone number too short after stripping non-digits");
        }
        ToolResult::success(canonical.as_str().to_string())
    }
}

pub struct FormatCurrencyTool;

#[derive(Deserialize)]
struct FormatCurrencyInput {
    amount: f64,
}

#[async_trait]
impl Tool for FormatCurrencyTool {
    fn name(&self) -> &str {
        "format_currency"
    }

    fn description(&self) -> &str {
        "Format a numeric value as Brazilian currency (e.g. 1234.5 -> \"R$ 1.234,50\")."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "amount": { "type": "number" } },
            "required": ["amount"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: FormatCurrencyInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        ToolResult::success(format_brl(input.amount))
    }
}

/// Format with a `.` thousands separator and `,` decimal separator, the
/// Brazilian convention (inverted from en-US).
fn format_brl(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let negative = cents < 0;
    let cents = cents.abs();
    let whole = cents / 100;
    let frac = cents % 100;

    let mut whole_str = whole.to_string();
    let mut grouped = String::new();
    while whole_str.len() > 3 {
        let split_at = whole_str.len() - 3;
        grouped = format!(".{}{}", &whole_str[split_at..], grouped);
        whole_str.truncate(split_at);
    }
    grouped = format!("{whole_str}{grouped}");

    format!("{}R$ {},{:02}", if negative { "-" } else { "" }, grouped, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn validate_phone_canonicalizes() {
        let tool = ValidatePhoneTool;
        let result = tool
            .execute(serde_json::json!({ "phone": "(11) 98888-7777" }))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.content, "5511988887777");
    }

    #[tokio::test]
    async fn validate_phone_rejects_too_short() {
        let tool = ValidatePhoneTool;
        let result = tool.execute(serde_json::json!({ "phone": "123" })).await;
        assert!(result.is_error);
    }

    #[test]
    fn format_brl_groups_thousands() {
        assert_eq!(format_brl(1234.5), "R$ 1.234,50");
        assert_eq!(format_brl(400.0), "R$ 400,00");
        assert_eq!(format_brl(1_000_000.99), "R$ 1.000.000,99");
    }

    #[tokio::test]
    async fn format_currency_tool_matches_helper() {
        let tool = FormatCurrencyTool;
        let result = tool.execute(serde_json::json!({ "amount": 4500.0 })).await;
        assert_eq!(result.content, "R$ 4.500,00");
    }
}
