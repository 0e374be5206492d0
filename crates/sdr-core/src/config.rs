use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8088;
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Top-level config (`solarprime.toml` + `SOLARPRIME_*` env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolarPrimeConfig {
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub whatsapp: WhatsAppConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub buffer: BufferConfig,
    #[serde(default)]
    pub humanizer: HumanizerConfig,
    #[serde(default)]
    pub followup: FollowUpConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

impl Default for SolarPrimeConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
            },
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
            whatsapp: WhatsAppConfig {
                gateway_url: "http://localhost:9000".to_string(),
                gateway_key: "change-me".to_string(),
                instance_name: "solarprime".to_string(),
            },
            webhook: WebhookConfig::default(),
            session: SessionConfig::default(),
            buffer: BufferConfig::default(),
            humanizer: HumanizerConfig::default(),
            followup: FollowUpConfig::default(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// The LLM, CRM, and calendar are external collaborators (see
/// `sdr-agent::{provider::LlmProvider, tools::crm::CrmClient,
/// tools::calendar::CalendarClient}`); this only carries the credentials
/// needed to reach each one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub anthropic: AnthropicConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            anthropic: AnthropicConfig {
                api_key: String::new(),
                base_url: default_anthropic_base_url(),
            },
            crm: CrmConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

/// §6 "CRM" — entity-oriented REST collaborator credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

/// §6 "Calendar" — event CRUD + free/busy collaborator credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
        }
    }
}

/// Outbound wiring to the WhatsApp gateway (§6 — gateway_url, gateway_key,
/// instance_name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub gateway_url: String,
    pub gateway_key: String,
    pub instance_name: String,
}

/// Inbound webhook auth (§6 — webhook_allowlist_ips, webhook_secret).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub allowlist_ips: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: None,
            allowlist_ips: Vec::new(),
        }
    }
}

/// §4.C session lifecycle parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_timeout_min")]
    pub session_timeout_min: i64,
    #[serde(default = "default_idle_warning_min")]
    pub idle_warning_min: i64,
    #[serde(default = "default_max_session_duration_h")]
    pub max_session_duration_h: i64,
    #[serde(default = "default_max_messages_per_session")]
    pub max_messages_per_session: u32,
    #[serde(default = "default_qualification_min_bill_commercial")]
    pub qualification_min_bill_commercial: f64,
    #[serde(default = "default_qualification_min_bill_residential")]
    pub qualification_min_bill_residential: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_min: default_session_timeout_min(),
            idle_warning_min: default_idle_warning_min(),
            max_session_duration_h: default_max_session_duration_h(),
            max_messages_per_session: default_max_messages_per_session(),
            qualification_min_bill_commercial: default_qualification_min_bill_commercial(),
            qualification_min_bill_residential: default_qualification_min_bill_residential(),
        }
    }
}

/// §4.B message-buffer coalescing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    #[serde(default = "default_buffer_window_ms")]
    pub buffer_window_ms: u64,
    #[serde(default = "default_buffer_cap")]
    pub per_phone_cap: usize,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffer_window_ms: default_buffer_window_ms(),
            per_phone_cap: default_buffer_cap(),
            dedup_capacity: default_dedup_capacity(),
        }
    }
}

/// §4.A humanizer pacing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanizerConfig {
    #[serde(default = "default_typing_wpm_min")]
    pub typing_wpm_min: u32,
    #[serde(default = "default_typing_wpm_max")]
    pub typing_wpm_max: u32,
    #[serde(default = "default_chunk_word_min")]
    pub chunk_word_min: usize,
    #[serde(default = "default_chunk_word_max")]
    pub chunk_word_max: usize,
}

impl Default for HumanizerConfig {
    fn default() -> Self {
        Self {
            typing_wpm_min: default_typing_wpm_min(),
            typing_wpm_max: default_typing_wpm_max(),
            chunk_word_min: default_chunk_word_min(),
            chunk_word_max: default_chunk_word_max(),
        }
    }
}

/// §4.E follow-up cadence and business-hours gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpConfig {
    #[serde(default = "default_followup_first_delay_min")]
    pub followup_first_delay_min: i64,
    #[serde(default = "default_followup_second_delay_h")]
    pub followup_second_delay_h: i64,
    #[serde(default = "default_business_hours_start")]
    pub business_hours_start: String,
    #[serde(default = "default_business_hours_end")]
    pub business_hours_end: String,
    #[serde(default = "default_business_tz")]
    pub business_tz: String,
}

impl Default for FollowUpConfig {
    fn default() -> Self {
        Self {
            followup_first_delay_min: default_followup_first_delay_min(),
            followup_second_delay_h: default_followup_second_delay_h(),
            business_hours_start: default_business_hours_start(),
            business_hours_end: default_business_hours_end(),
            business_tz: default_business_tz(),
        }
    }
}

/// §4.D orchestrator policy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_followup_model")]
    pub followup_model: String,
    #[serde(default = "bool_true")]
    pub reasoning_auto: bool,
    #[serde(default = "default_max_tool_hops")]
    pub max_tool_hops: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            followup_model: default_followup_model(),
            reasoning_auto: true,
            max_tool_hops: default_max_tool_hops(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.solarprime/solarprime.db", home)
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_followup_model() -> String {
    "claude-haiku-4-6".to_string()
}
fn default_session_timeout_min() -> i64 {
    30
}
fn default_idle_warning_min() -> i64 {
    20
}
fn default_max_session_duration_h() -> i64 {
    2
}
fn default_max_messages_per_session() -> u32 {
    100
}
fn default_qualification_min_bill_commercial() -> f64 {
    4000.0
}
fn default_qualification_min_bill_residential() -> f64 {
    400.0
}
fn default_buffer_window_ms() -> u64 {
    3_000
}
fn default_buffer_cap() -> usize {
    20
}
fn default_dedup_capacity() -> usize {
    1_000
}
fn default_typing_wpm_min() -> u32 {
    45
}
fn default_typing_wpm_max() -> u32 {
    55
}
fn default_chunk_word_min() -> usize {
    3
}
fn default_chunk_word_max() -> usize {
    15
}
fn default_followup_first_delay_min() -> i64 {
    30
}
fn default_followup_second_delay_h() -> i64 {
    24
}
fn default_business_hours_start() -> String {
    "08:00".to_string()
}
fn default_business_hours_end() -> String {
    "18:00".to_string()
}
fn default_business_tz() -> String {
    "America/Sao_Paulo".to_string()
}
fn default_max_tool_hops() -> usize {
    8
}

impl SolarPrimeConfig {
    /// Load config from a TOML file with `SOLARPRIME_*` env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.solarprime/solarprime.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SolarPrimeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SOLARPRIME_").split("_"))
            .extract()
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.solarprime/solarprime.toml", home)
}
