//! CRM tools (§4.D, §6): a narrow collaborator trait plus an HTTP
//! implementation. Custom fields and pipeline stages are referenced by
//! numeric ids the CRM assigns; §6 notes these are "resolved on first use
//! and cached" — `IdCache` below is that cache, grounded on
//! cache-map patterns elsewhere in the pack (kept in-process; there is
//! exactly one CRM collaborator per process, so a `DashMap` needs no
//! eviction policy beyond the process lifetime).

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use tracing::warn;

use super::{IdempotencyClass, Tool, ToolResult};

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct CrmLead {
    pub external_id: String,
    pub phone: String,
    pub name: Option<String>,
    pub stage_id: u64,
}

/// The CRM as an external collaborator. One concrete implementation
/// (`HttpCrmClient`) is wired in `sdr-gateway`'s `main.rs`.
#[async_trait]
pub trait CrmClient: Send + Sync {
    async fn search_lead(&self, phone: &str) -> Result<Option<CrmLead>, CrmError>;
    async fn create_lead(&self, phone: &str, name: Option<&str>) -> Result<CrmLead, CrmError>;
    async fn update_lead(&self, external_id: &str, fields: serde_json::Value) -> Result<(), CrmError>;
    async fn move_stage(&self, external_id: &str, stage_name: &str) -> Result<(), CrmError>;
    async fn add_note(&self, external_id: &str, note: &str) -> Result<(), CrmError>;
    async fn schedule_activity(
        &self,
        external_id: &str,
        description: &str,
        due: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CrmError>;
    /// Resolve a human-readable pipeline stage name to the CRM's numeric id.
    async fn resolve_stage_id(&self, stage_name: &str) -> Result<u64, CrmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("CRM api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("unknown pipeline stage: {0}")]
    UnknownStage(String),
}

impl CrmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CrmError::Http(e) => e.is_timeout() || e.is_connect(),
            CrmError::Api { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            CrmError::UnknownStage(_) => false,
        }
    }
}

fn crm_result(e: CrmError) -> ToolResult {
    if e.is_retryable() {
        ToolResult::retryable_error(e.to_string())
    } else {
        ToolResult::error(e.to_string())
    }
}

/// In-process cache from human-readable name to the CRM's numeric id,
/// populated lazily on first resolution.
#[derive(Default)]
pub struct IdCache {
    stages: DashMap<String, u64>,
}

impl IdCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_stage(&self, name: &str) -> Option<u64> {
        self.stages.get(name).map(|v| *v)
    }

    pub fn put_stage(&self, name: &str, id: u64) {
        self.stages.insert(name.to_string(), id);
    }
}

pub struct HttpCrmClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    cache: IdCache,
}

impl HttpCrmClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            cache: IdCache::new(),
        }
    }
}

#[async_trait]
impl CrmClient for HttpCrmClient {
    async fn search_lead(&self, phone: &str) -> Result<Option<CrmLead>, CrmError> {
        let url = format!("{}/leads?phone={}", self.base_url, phone);
        let resp = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(CrmError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        let lead: Option<CrmLead> = resp.json().await.map_err(CrmError::Http)?;
        Ok(lead)
    }

    async fn create_lead(&self, phone: &str, name: Option<&str>) -> Result<CrmLead, CrmError> {
        // unique-by-key: probe first, upgrade to update on conflict (§4.D).
        if let Some(existing) = self.search_lead(phone).await? {
            if let Some(name) = name {
                self.update_lead(&existing.external_id, serde_json::json!({ "name": name }))
                    .await?;
            }
            return Ok(existing);
        }

        let url = format!("{}/leads", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "phone": phone, "name": name }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CrmError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        resp.json().await.map_err(CrmError::Http)
    }

    async fn update_lead(&self, external_id: &str, fields: serde_json::Value) -> Result<(), CrmError> {
        let url = format!("{}/leads/{}", self.base_url, external_id);
        let resp = self.client.patch(&url).bearer_auth(&self.api_key).json(&fields).send().await?;
        if !resp.status().is_success() {
            return Err(CrmError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn move_stage(&self, external_id: &str, stage_name: &str) -> Result<(), CrmError> {
        let stage_id = self.resolve_stage_id(stage_name).await?;
        self.update_lead(external_id, serde_json::json!({ "stage_id": stage_id })).await
    }

    async fn add_note(&self, external_id: &str, note: &str) -> Result<(), CrmError> {
        let url = format!("{}/leads/{}/notes", self.base_url, external_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": note }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CrmError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn schedule_activity(
        &self,
        external_id: &str,
        description: &str,
        due: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CrmError> {
        let url = format!("{}/leads/{}/activities", self.base_url, external_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "description": description, "due_at": due.to_rfc3339() }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(CrmError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn resolve_stage_id(&self, stage_name: &str) -> Result<u64, CrmError> {
        if let Some(id) = self.cache.get_stage(stage_name) {
            return Ok(id);
        }
        let url = format!("{}/pipeline_stages", self.base_url);
        let resp = self.client.get(&url).bearer_auth(&self.api_key).send().await?;
        if !resp.status().is_success() {
            return Err(CrmError::Api {
                status: resp.status().as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }
        let stages: Vec<(String, u64)> = resp.json().await.map_err(CrmError::Http)?;
        for (name, id) in &stages {
            self.cache.put_stage(name, *id);
        }
        stages
            .into_iter()
            .find(|(name, _)| name == stage_name)
            .map(|(_, id)| id)
            .ok_or_else(|| CrmError::UnknownStage(stage_name.to_string()))
    }
}

pub struct SearchLeadTool {
    crm: Arc<dyn CrmClient>,
}

impl SearchLeadTool {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }
}

#[derive(Deserialize)]
struct SearchLeadInput {
    phone: String,
}

#[async_trait]
impl Tool for SearchLeadTool {
    fn name(&self) -> &str {
        "search_lead"
    }

    fn description(&self) -> &str {
        "Search the CRM for a lead by phone number."
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
        let input: SearchLeadInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.crm.search_lead(&input.phone).await {
            Ok(Some(lead)) => ToolResult::success(serde_json::to_string(&lead).unwrap_or_default()),
            Ok(None) => ToolResult::success("not_found"),
            Err(e) => crm_result(e),
        }
    }
}

pub struct CreateLeadTool {
    crm: Arc<dyn CrmClient>,
}

impl CreateLeadTool {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }
}

#[derive(Deserialize)]
struct CreateLeadInput {
    phone: String,
    name: Option<String>,
}

#[async_trait]
impl Tool for CreateLeadTool {
    fn name(&self) -> &str {
        "create_lead"
    }

    fn description(&self) -> &str {
        "Create a new lead in the CRM, or return the existing one for this phone number."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "phone": { "type": "string" },
                "name": { "type": "string" }
            },
            "required": ["phone"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::UniqueByKey
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: CreateLeadInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.crm.create_lead(&input.phone, input.name.as_deref()).await {
            Ok(lead) => ToolResult::success(serde_json::to_string(&lead).unwrap_or_default()),
            Err(e) => crm_result(e),
        }
    }
}

pub struct UpdateLeadTool {
    crm: Arc<dyn CrmClient>,
}

impl UpdateLeadTool {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }
}

#[derive(Deserialize)]
struct UpdateLeadInput {
    external_id: String,
    fields: serde_json::Value,
}

#[async_trait]
impl Tool for UpdateLeadTool {
    fn name(&self) -> &str {
        "update_lead"
    }

    fn description(&self) -> &str {
        "Update fields on an existing CRM lead."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "external_id": { "type": "string" },
                "fields": { "type": "object" }
            },
            "required": ["external_id", "fields"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: UpdateLeadInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.crm.update_lead(&input.external_id, input.fields).await {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => crm_result(e),
        }
    }
}

pub struct MoveStageTool {
    crm: Arc<dyn CrmClient>,
}

impl MoveStageTool {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }
}

#[derive(Deserialize)]
struct MoveStageInput {
    external_id: String,
    stage_name: String,
}

#[async_trait]
impl Tool for MoveStageTool {
    fn name(&self) -> &str {
        "move_stage"
    }

    fn description(&self) -> &str {
        "Move a CRM lead to a different pipeline stage, by stage name."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "external_id": { "type": "string" },
                "stage_name": { "type": "string" }
            },
            "required": ["external_id", "stage_name"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: MoveStageInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.crm.move_stage(&input.external_id, &input.stage_name).await {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => crm_result(e),
        }
    }
}

pub struct AddNoteTool {
    crm: Arc<dyn CrmClient>,
}

impl AddNoteTool {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }
}

#[derive(Deserialize)]
struct AddNoteInput {
    external_id: String,
    note: String,
}

#[async_trait]
impl Tool for AddNoteTool {
    fn name(&self) -> &str {
        "add_note"
    }

    fn description(&self) -> &str {
        "Add a free-text note to a CRM lead's timeline."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "external_id": { "type": "string" },
                "note": { "type": "string" }
            },
            "required": ["external_id", "note"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: AddNoteInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self.crm.add_note(&input.external_id, &input.note).await {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => crm_result(e),
        }
    }
}

pub struct ScheduleActivityTool {
    crm: Arc<dyn CrmClient>,
}

impl ScheduleActivityTool {
    pub fn new(crm: Arc<dyn CrmClient>) -> Self {
        Self { crm }
    }
}

#[derive(Deserialize)]
struct ScheduleActivityInput {
    external_id: String,
    description: String,
    due: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
impl Tool for ScheduleActivityTool {
    fn name(&self) -> &str {
        "schedule_activity"
    }

    fn description(&self) -> &str {
        "Schedule a follow-up activity on a CRM lead."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "external_id": { "type": "string" },
                "description": { "type": "string" },
                "due": { "type": "string", "format": "date-time" }
            },
            "required": ["external_id", "description", "due"]
        })
    }

    fn idempotency(&self) -> IdempotencyClass {
        IdempotencyClass::SafeRetry
    }

    async fn execute(&self, input: serde_json::Value) -> ToolResult {
        let input: ScheduleActivityInput = match serde_json::from_value(input) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid input: {e}")),
        };
        match self
            .crm
            .schedule_activity(&input.external_id, &input.description, input.due)
            .await
        {
            Ok(()) => ToolResult::success("ok"),
            Err(e) => {
                warn!(error = %e, "schedule_activity failed");
                crm_result(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeCrm;

    #[async_trait]
    impl CrmClient for FakeCrm {
        async fn search_lead(&self, phone: &str) -> Result<Option<CrmLead>, CrmError> {
            if phone == "11999990000" {
                Ok(Some(CrmLead {
                    external_id: "crm-1".into(),
                    phone: phone.to_string(),
                    name: None,
                    stage_id: 1,
                }))
            } else {
                Ok(None)
            }
        }
        async fn create_lead(&self, phone: &str, _name: Option<&str>) -> Result<CrmLead, CrmError> {
            Ok(CrmLead {
                external_id: "crm-new".into(),
                phone: phone.to_string(),
                name: None,
                stage_id: 1,
            })
        }
        async fn update_lead(&self, _id: &str, _fields: serde_json::Value) -> Result<(), CrmError> {
            Ok(())
        }
        async fn move_stage(&self, _id: &str, _stage: &str) -> Result<(), CrmError> {
            Ok(())
        }
        async fn add_note(&self, _id: &str, _note: &str) -> Result<(), CrmError> {
            Ok(())
        }
        async fn schedule_activity(
            &self,
            _id: &str,
            _desc: &str,
            _due: chrono::DateTime<chrono::Utc>,
        ) -> Result<(), CrmError> {
            Ok(())
        }
        async fn resolve_stage_id(&self, _name: &str) -> Result<u64, CrmError> {
            Ok(42)
        }
    }

    #[tokio::test]
    async fn search_lead_found() {
        let tool = SearchLeadTool::new(Arc::new(FakeCrm));
        let result = tool.execute(serde_json::json!({ "phone": "11999990000" })).await;
        assert!(!result.is_error);
        assert!(result.content.contains("crm-1"));
    }

    #[tokio::test]
    async fn search_lead_not_found() {
        let tool = SearchLeadTool::new(Arc::new(FakeCrm));
        let result = tool.execute(serde_json::json!({ "phone": "11000000000" })).await;
        assert!(!result.is_error);
        assert_eq!(result.content, "not_found");
    }

    #[test]
    fn id_cache_round_trips() {
        let cache = IdCache::new();
        assert!(cache.get_stage("qualified").is_none());
        cache.put_stage("qualified", 7);
        assert_eq!(cache.get_stage("qualified"), Some(7));
    }
}
