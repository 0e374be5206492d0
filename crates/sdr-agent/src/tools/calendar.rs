//! Calendar tools (§4.D, §6): a narrow collaborator trait plus an HTTP
//! implementation, grounded on the same reqwest-client shape as `crm.rs`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{IdempotencyClass, Tool, ToolResult};

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct MeetingSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct Meeting {
    pub meeting_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// The calendar as an external collaborator. One concrete implementation
/// (`HttpCalendarClient`) is wired in `sdr-gateway`'s `main.rs`.
#[async_trait]
pub trait CalendarClient: Send + Sync {
    async fn check_availability(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<MeetingSlot>, CalendarError>;
    async fn create_meeting(&self, start: DateTime<Utc>, end: DateTime<Utc>, attendee_phone: &str) -> Result<Meeting, CalendarError>;
    async fn update_meeting(&self, meeting_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), CalendarError>;
    async fn cancel_meeting(&self, meeting_id: &str) -> Result<(), CalendarError>;
    async fn send_invite(&self, meeting_id: &str, attendee_phone: &str) -> Result<(), CalendarError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CalendarError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("calendar api error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl CalendarError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CalendarError::Http(e) => e.is_timeout() || e.is_connect(),
            CalendarError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
        }
    }
}

fn calendar_result(e: CalendarError) -> ToolResult {
    if e.is_retryable() {
        ToolResult::retryable_error(e.to_string())
    } else {
        ToolResult::error(e.to_string())
    }
}

pub struct HttpCalendarClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpCalendarClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }

    async fn check(&self, resp: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(CalendarError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl CalendarClient for HttpCalendarClient {
    async fn check_availability(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<MeetingSlot>, CalendarError> {
        let url = format!(
            "{}/availability?from={}&to={}",
            self.base_url,
            from.to_rfc3339(),
            to.to_rfc3339()
        );
        let resp = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        let resp = self.check(resp).await?;
        resp.json().await.map_err(CalendarError::Http)
    }

    async fn create_meeting(&self, start: DateTime<Utc>, end: DateTime<Utc>, attendee_phone: &str) -> Result<Meeting, CalendarError> {
        let url = format!("{}/meetings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "start": start.to_rfc3339(),
                "end": end.to_rfc3339(),
                "attendee_phone": attendee_phone,
            }))
            .send()
            .await?;
        let resp = self.check(resp).await?;
        resp.json().await.map_err(CalendarError::Http)
    }

    async fn update_meeting(&self, meeting_id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), CalendarError> {
        let url = format!("{}/meetings/{}", self.base_url, meeting_id);
        let resp = self
            .client
            .patch(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "start": start.to_rfc3339(), "end": end.to_rfc3339() }))
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    async fn cancel_meeting(&self, meeting_id: &str) -> Result<(), CalendarError> {
        let url = format!("{}/meetings/{}", self.base_url, meeting_id);
        let resp = self.client.delete(&url).bearer_auth(&self.api_key).send().await?;
        self.check(resp).await?;
        Ok(())
    }

    async fn send_invite(&self, meeting_id: &str, attendee_phone: &str) -> Result<(), CalendarError> {
        let url = format!("{}/meetings/{}/invite", self.base_url, meeting_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "attendee_phone": attendee_phone }))
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }
}

pub struct CheckAvailabilityTool {
    calendar: Arc<dyn CalendarClient>,
}

impl CheckAvailabilityTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[derive(Deserialize)]
struct CheckAvailabilityInput {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[async_trait]
impl Tool for CheckAvailabilityTool {
    fn name(&self) -> &str {
        "check_availability"
    }

    fn description(&self) -> &str {
        "Check open meeting slots on the sales calendar within a time range."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "format": "date-time" },
                "to": { "type": "string", "format": "date-time" }
            },
            "required": ["from", "to"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: CheckAvailabilityInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.calendar.check_availability(input.from, input.to).await {
            Ok(slots) => ToolResult::success(serde_json::to_string(&slots).unwrap_or_default()),
            Err(e) => calendar_result(e),
        }
    }
}

pub struct CreateMeetingTool {
    calendar: Arc<dyn CalendarClient>,
}

impl CreateMeetingTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[derive(Deserialize)]
struct CreateMeetingInput {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    attendee_phone: String,
}

#[async_trait]
impl Tool for CreateMeetingTool {
    fn name(&self) -> &str {
        "create_meeting"
    }

    fn description(&self) -> &str {
        "Book a meeting with the lead."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "start": { "type": "string", "format": "date-time" },
                "end": { "type": "string", "format": "date-time" },
                "attendee_phone": { "type": "string" }
            },
            "required": ["start", "end", "attendee_phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::UniqueByKey
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: CreateMeetingInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self
            .calendar
            .create_meeting(input.start, input.end, &input.attendee_phone)
            .await
        {
            Ok(meeting) => ToolResult::success(serde_json::to_string(&meeting).unwrap_or_default()),
            Err(e) => calendar_result(e),
        }
    }
}

pub struct UpdateMeetingTool {
    calendar: Arc<dyn CalendarClient>,
}

impl UpdateMeetingTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[derive(Deserialize)]
struct UpdateMeetingInput {
    meeting_id: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[async_trait]
impl Tool for UpdateMeetingTool {
    fn name(&self) -> &str {
        "update_meeting"
    }

    fn description(&self) -> &str {
        "Reschedule an existing meeting to a new time."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "meeting_id": { "type": "string" },
                "start": { "type": "string", "format": "date-time" },
                "end": { "type": "string", "format": "date-time" }
            },
            "required": ["meeting_id", "start", "end"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: UpdateMeetingInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self
            .calendar
            .update_meeting(&input.meeting_id, input.start, input.end)
            .await
        {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => calendar_result(e),
        }
    }
}

pub struct CancelMeetingTool {
    calendar: Arc<dyn CalendarClient>,
}

impl CancelMeetingTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[derive(Deserialize)]
struct CancelMeetingInput {
    meeting_id: String,
}

#[async_trait]
impl Tool for CancelMeetingTool {
    fn name(&self) -> &str {
        "cancel_meeting"
    }

    fn description(&self) -> &str {
        "Cancel an existing meeting."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": { "meeting_id": { "type": "string" } },
            "required": ["meeting_id"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: CancelMeetingInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.calendar.cancel_meeting(&input.meeting_id).await {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => calendar_result(e),
        }
    }
}

pub struct SendInviteTool {
    calendar: Arc<dyn CalendarClient>,
}

impl SendInviteTool {
    pub fn new(calendar: Arc<dyn CalendarClient>) -> Self {
        Self { calendar }
    }
}

#[derive(Deserialize)]
struct SendInviteInput {
    meeting_id: String,
    attendee_phone: String,
}

#[async_trait]
impl Tool for SendInviteTool {
    fn name(&self) -> &str {
        "send_invite"
    }

    fn description(&self) -> &str {
        "Send a calendar invite for an existing meeting to the lead."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "meeting_id": { "type": "string" },
                "attendee_phone": { "type": "string" }
            },
            "required": ["meeting_id", "attendee_phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: SendInviteInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.calendar.send_invite(&input.meeting_id, &input.attendee_phone).await {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => calendar_result(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCalendar;

    #[async_trait]
    impl CalendarClient for FakeCalendar {
        async fn check_availability(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<MeetingSlot>, CalendarError> {
            Ok(vec![MeetingSlot { start: from, end: to }])
        }
        async fn create_meeting(&self, start: DateTime<Utc>, end: DateTime<Utc>, _phone: &str) -> Result<Meeting, CalendarError> {
            Ok(Meeting {
                meeting_id: "m-1".into(),
                start,
                end,
            })
        }
        async fn update_meeting(&self, _id: &str, _start: DateTime<Utc>, _end: DateTime<Utc>) -> Result<(), CalendarError> {
            Ok(())
        }
        async fn cancel_meeting(&self, _id: &str) -> Result<(), CalendarError> {
            Ok(())
        }
        async fn send_invite(&self, _id: &str, _phone: &str) -> Result<(), CalendarError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn create_meeting_returns_id() {
        let tool = CreateMeetingTool::new(Arc::new(FakeCalendar));
        let now = Utc::now();
        let result = tool
            .execute(serde_json::json!({
                "start": now.to_rfc3339(),
                "end": (now + chrono::Duration::hours(1)).to_rfc3339(),
                "attendee_phone": "11988887777",
            }))
            .await;
        assert!(!result.is_error);
        assert!(result.content.contains("m-1"));
    }

    #[tokio::test]
    async fn cancel_meeting_rejects_missing_id() {
        let tool = CancelMeetingTool::new(Arc::new(FakeCalendar));
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_error);
    }
}
