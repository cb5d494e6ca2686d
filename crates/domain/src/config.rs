//! Layered configuration with per-section sub-structs and a validation
//! pass that produces graded diagnostics rather than failing fast.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    McpServer,
    AutomationWorker,
}

impl std::str::FromStr for Role {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mcp_server" => Ok(Role::McpServer),
            "automation_worker" => Ok(Role::AutomationWorker),
            other => Err(format!("unknown ROLE `{other}`, expected mcp_server|automation_worker")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    pub enabled: bool,
    pub poller_enabled: bool,
    pub status_write_enabled: bool,
    pub trigger_on_new_record_event: bool,
    pub trigger_on_new_record_scan: bool,
    pub trigger_on_new_record_scan_requires_checkpoint: bool,
    pub schema_sync_enabled: bool,
    pub schema_sync_interval_seconds: u64,
    pub schema_sync_event_driven: bool,
    pub schema_webhook_url: Option<String>,
    pub schema_webhook_secret: Option<String>,
    pub schema_webhook_drill: bool,
    pub action_max_retries: u32,
    pub action_retry_delay_seconds: u64,
    pub sync_deletions_enabled: bool,
    pub sync_deletions_max_per_run: u32,
    pub http_allowed_domains: Vec<String>,
    pub http_timeout_seconds: u64,
    pub webhook_api_key: Option<String>,
    pub webhook_signature_secret: Option<String>,
    pub webhook_timestamp_tolerance_seconds: i64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poller_enabled: false,
            status_write_enabled: false,
            trigger_on_new_record_event: false,
            trigger_on_new_record_scan: false,
            trigger_on_new_record_scan_requires_checkpoint: true,
            schema_sync_enabled: true,
            schema_sync_interval_seconds: 300,
            schema_sync_event_driven: true,
            schema_webhook_url: None,
            schema_webhook_secret: None,
            schema_webhook_drill: false,
            action_max_retries: 3,
            action_retry_delay_seconds: 2,
            sync_deletions_enabled: false,
            sync_deletions_max_per_run: 100,
            http_allowed_domains: Vec::new(),
            http_timeout_seconds: 10,
            webhook_api_key: None,
            webhook_signature_secret: None,
            webhook_timestamp_tolerance_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub task_base_url: Option<String>,
    pub task_model: Option<String>,
    pub task_api_key: Option<String>,
    pub chat_base_url: Option<String>,
    pub chat_model: Option<String>,
    pub chat_api_key: Option<String>,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            task_base_url: None,
            task_model: None,
            task_api_key: None,
            chat_base_url: None,
            chat_model: None,
            chat_api_key: None,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelConfig {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub verification_token: Option<String>,
    pub encrypt_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BitableConfig {
    pub default_app_token: Option<String>,
    pub default_table_id: Option<String>,
    pub default_view_id: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    pub postgres_dsn: Option<String>,
    pub scheduler_enabled: bool,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            postgres_dsn: None,
            scheduler_enabled: true,
        }
    }
}

/// Thresholds and timers for the conversation orchestrator's intent
/// ladder and slot-memory lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Keyword-score floor above which a skill dispatches without an LLM
    /// confirmation call.
    pub direct_execute_threshold: f64,
    /// Keyword-score floor above which an LLM classify call is made
    /// before dispatch; below this, the default skill (chitchat) runs.
    pub llm_confirm_threshold: f64,
    /// Confidence floor for rule-based table disambiguation; below this
    /// the LLM is asked to pick from a shortlist.
    pub table_confidence_threshold: f64,
    /// Upper bound on chained skill hops in one turn.
    pub max_hops: u32,
    /// Conversation state idle eviction window, minutes.
    pub idle_ttl_minutes: i64,
    /// Pending-action expiry window, minutes.
    pub pending_action_ttl_minutes: i64,
    /// Default hour (local, 24h) for reminders parsed without a time.
    pub reminder_default_hour: u32,
    /// Conversation timezone offset from UTC, hours.
    pub timezone_offset_hours: i64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            direct_execute_threshold: 0.75,
            llm_confirm_threshold: 0.4,
            table_confidence_threshold: 0.65,
            max_hops: 2,
            idle_ttl_minutes: 30,
            pending_action_ttl_minutes: 10,
            reminder_default_hour: 18,
            timezone_offset_hours: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub role: Role,
    pub bind_addr: String,
    pub mcp_server_base: Option<String>,
    pub bearer_token: Option<String>,
    /// Directory for JSON-file-backed state (snapshots, idempotency,
    /// conversations, run log, rules hot-reload input lives alongside it).
    pub state_dir: String,
    /// Path to the declarative automation rules file.
    pub rules_path: String,
    /// Per-IP token-bucket rate limiting. Disabled unless both
    /// `RATE_LIMIT_RPS` and `RATE_LIMIT_BURST` are set.
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            role: Role::McpServer,
            bind_addr: "0.0.0.0:8080".to_string(),
            mcp_server_base: None,
            bearer_token: None,
            state_dir: "./data".to_string(),
            rules_path: "./rules.yaml".to_string(),
            rate_limit: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server: ServerConfig,
    pub automation: AutomationConfig,
    pub llm: LlmConfig,
    pub channel: ChannelConfig,
    pub bitable: BitableConfig,
    pub reminders: RemindersConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset. Never fails — validation is a
    /// separate, explicit pass.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Ok(v) = std::env::var("ROLE") {
            if let Ok(role) = v.parse() {
                cfg.server.role = role;
            }
        }
        if let Ok(v) = std::env::var("BIND_ADDR") {
            cfg.server.bind_addr = v;
        }
        if let Ok(v) = std::env::var("MCP_SERVER_BASE") {
            cfg.server.mcp_server_base = Some(v);
        }
        if let Ok(v) = std::env::var("BEARER_TOKEN") {
            cfg.server.bearer_token = Some(v);
        }
        if let Ok(v) = std::env::var("STATE_DIR") {
            cfg.server.state_dir = v;
        }
        if let Ok(v) = std::env::var("RULES_PATH") {
            cfg.server.rules_path = v;
        }
        if let (Ok(rps), Ok(burst)) = (std::env::var("RATE_LIMIT_RPS"), std::env::var("RATE_LIMIT_BURST")) {
            if let (Ok(requests_per_second), Ok(burst_size)) = (rps.parse(), burst.parse()) {
                cfg.server.rate_limit = Some(RateLimitConfig { requests_per_second, burst_size });
            }
        }

        cfg.automation.enabled = env_bool("AUTOMATION_ENABLED", cfg.automation.enabled);
        cfg.automation.poller_enabled =
            env_bool("AUTOMATION_POLLER_ENABLED", cfg.automation.poller_enabled);
        cfg.automation.status_write_enabled = env_bool(
            "AUTOMATION_STATUS_WRITE_ENABLED",
            cfg.automation.status_write_enabled,
        );
        cfg.automation.trigger_on_new_record_event = env_bool(
            "AUTOMATION_TRIGGER_ON_NEW_RECORD_EVENT",
            cfg.automation.trigger_on_new_record_event,
        );
        cfg.automation.trigger_on_new_record_scan = env_bool(
            "AUTOMATION_TRIGGER_ON_NEW_RECORD_SCAN",
            cfg.automation.trigger_on_new_record_scan,
        );
        cfg.automation.trigger_on_new_record_scan_requires_checkpoint = env_bool(
            "AUTOMATION_TRIGGER_ON_NEW_RECORD_SCAN_REQUIRES_CHECKPOINT",
            cfg.automation.trigger_on_new_record_scan_requires_checkpoint,
        );
        cfg.automation.schema_sync_enabled =
            env_bool("AUTOMATION_SCHEMA_SYNC_ENABLED", cfg.automation.schema_sync_enabled);
        cfg.automation.schema_sync_interval_seconds = env_u64(
            "AUTOMATION_SCHEMA_SYNC_INTERVAL_SECONDS",
            cfg.automation.schema_sync_interval_seconds,
        );
        cfg.automation.schema_sync_event_driven = env_bool(
            "AUTOMATION_SCHEMA_SYNC_EVENT_DRIVEN",
            cfg.automation.schema_sync_event_driven,
        );
        if let Ok(v) = std::env::var("AUTOMATION_SCHEMA_WEBHOOK_URL") {
            cfg.automation.schema_webhook_url = Some(v);
        }
        if let Ok(v) = std::env::var("AUTOMATION_SCHEMA_WEBHOOK_SECRET") {
            cfg.automation.schema_webhook_secret = Some(v);
        }
        cfg.automation.schema_webhook_drill = env_bool(
            "AUTOMATION_SCHEMA_WEBHOOK_DRILL",
            cfg.automation.schema_webhook_drill,
        );
        cfg.automation.action_max_retries =
            env_u64("AUTOMATION_ACTION_MAX_RETRIES", cfg.automation.action_max_retries as u64) as u32;
        cfg.automation.action_retry_delay_seconds = env_u64(
            "AUTOMATION_ACTION_RETRY_DELAY_SECONDS",
            cfg.automation.action_retry_delay_seconds,
        );
        cfg.automation.sync_deletions_enabled = env_bool(
            "AUTOMATION_SYNC_DELETIONS_ENABLED",
            cfg.automation.sync_deletions_enabled,
        );
        cfg.automation.sync_deletions_max_per_run = env_u64(
            "AUTOMATION_SYNC_DELETIONS_MAX_PER_RUN",
            cfg.automation.sync_deletions_max_per_run as u64,
        ) as u32;
        if let Ok(v) = std::env::var("AUTOMATION_HTTP_ALLOWED_DOMAINS") {
            cfg.automation.http_allowed_domains =
                v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
        }
        cfg.automation.http_timeout_seconds =
            env_u64("AUTOMATION_HTTP_TIMEOUT_SECONDS", cfg.automation.http_timeout_seconds);
        if let Ok(v) = std::env::var("AUTOMATION_WEBHOOK_API_KEY") {
            cfg.automation.webhook_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("AUTOMATION_WEBHOOK_SIGNATURE_SECRET") {
            cfg.automation.webhook_signature_secret = Some(v);
        }
        cfg.automation.webhook_timestamp_tolerance_seconds = env_i64(
            "AUTOMATION_WEBHOOK_TIMESTAMP_TOLERANCE_SECONDS",
            cfg.automation.webhook_timestamp_tolerance_seconds,
        );

        if let Ok(v) = std::env::var("TASK_LLM_BASE_URL") {
            cfg.llm.task_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("TASK_LLM_MODEL") {
            cfg.llm.task_model = Some(v);
        }
        if let Ok(v) = std::env::var("TASK_LLM_API_KEY") {
            cfg.llm.task_api_key = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_BASE_URL") {
            cfg.llm.chat_base_url = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_MODEL") {
            cfg.llm.chat_model = Some(v);
        }
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            cfg.llm.chat_api_key = Some(v);
        }
        cfg.llm.timeout_seconds = env_u64("LLM_TIMEOUT_SECONDS", cfg.llm.timeout_seconds);

        if let Ok(v) = std::env::var("FEISHU_APP_ID") {
            cfg.channel.app_id = Some(v);
        }
        if let Ok(v) = std::env::var("FEISHU_APP_SECRET") {
            cfg.channel.app_secret = Some(v);
        }
        if let Ok(v) = std::env::var("FEISHU_VERIFICATION_TOKEN") {
            cfg.channel.verification_token = Some(v);
        }
        if let Ok(v) = std::env::var("FEISHU_ENCRYPT_KEY") {
            cfg.channel.encrypt_key = Some(v);
        }

        if let Ok(v) = std::env::var("BITABLE_APP_TOKEN") {
            cfg.bitable.default_app_token = Some(v);
        }
        if let Ok(v) = std::env::var("BITABLE_TABLE_ID") {
            cfg.bitable.default_table_id = Some(v);
        }
        if let Ok(v) = std::env::var("BITABLE_VIEW_ID") {
            cfg.bitable.default_view_id = Some(v);
        }
        if let Ok(v) = std::env::var("BITABLE_DOMAIN") {
            cfg.bitable.domain = Some(v);
        }

        if let Ok(v) = std::env::var("POSTGRES_DSN") {
            cfg.reminders.postgres_dsn = Some(v);
        }
        cfg.reminders.scheduler_enabled =
            env_bool("REMINDER_SCHEDULER_ENABLED", cfg.reminders.scheduler_enabled);

        cfg.orchestrator.direct_execute_threshold = env_f64(
            "ORCHESTRATOR_DIRECT_EXECUTE_THRESHOLD",
            cfg.orchestrator.direct_execute_threshold,
        );
        cfg.orchestrator.llm_confirm_threshold = env_f64(
            "ORCHESTRATOR_LLM_CONFIRM_THRESHOLD",
            cfg.orchestrator.llm_confirm_threshold,
        );
        cfg.orchestrator.table_confidence_threshold = env_f64(
            "ORCHESTRATOR_TABLE_CONFIDENCE_THRESHOLD",
            cfg.orchestrator.table_confidence_threshold,
        );
        cfg.orchestrator.max_hops =
            env_u64("ORCHESTRATOR_MAX_HOPS", cfg.orchestrator.max_hops as u64) as u32;
        cfg.orchestrator.idle_ttl_minutes =
            env_i64("ORCHESTRATOR_IDLE_TTL_MINUTES", cfg.orchestrator.idle_ttl_minutes);
        cfg.orchestrator.pending_action_ttl_minutes = env_i64(
            "ORCHESTRATOR_PENDING_ACTION_TTL_MINUTES",
            cfg.orchestrator.pending_action_ttl_minutes,
        );
        cfg.orchestrator.reminder_default_hour = env_u64(
            "ORCHESTRATOR_REMINDER_DEFAULT_HOUR",
            cfg.orchestrator.reminder_default_hour as u64,
        ) as u32;
        cfg.orchestrator.timezone_offset_hours = env_i64(
            "ORCHESTRATOR_TIMEZONE_OFFSET_HOURS",
            cfg.orchestrator.timezone_offset_hours,
        );

        cfg
    }

    /// Validate cross-field and presence requirements, returning every
    /// diagnostic found rather than stopping at the first.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.role == Role::AutomationWorker {
            if self.automation.webhook_api_key.is_none()
                && self.automation.webhook_signature_secret.is_none()
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: "automation.webhook_api_key".into(),
                    message: "no webhook auth configured; external webhooks will be rejected".into(),
                });
            }
            if self.automation.sync_deletions_enabled && self.automation.sync_deletions_max_per_run == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "automation.sync_deletions_max_per_run".into(),
                    message: "must be > 0 when sync deletions are enabled".into(),
                });
            }
            if self.automation.schema_webhook_drill && self.automation.schema_webhook_url.is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "automation.schema_webhook_url".into(),
                    message: "drill mode requires a webhook url".into(),
                });
            }
        }

        if self.server.role == Role::McpServer && self.bitable.default_app_token.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "bitable.default_app_token".into(),
                message: "no default app_token set; every call must supply one explicitly".into(),
            });
        }

        if self.server.bearer_token.is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.bearer_token".into(),
                message: "running without bearer auth (dev mode)".into(),
            });
        }

        for (field, url) in [
            ("llm.task_base_url", &self.llm.task_base_url),
            ("llm.chat_base_url", &self.llm.chat_base_url),
        ] {
            if url.is_none() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: field.into(),
                    message: "not configured; calls on this route will fail".into(),
                });
            }
        }

        if self.orchestrator.direct_execute_threshold < self.orchestrator.llm_confirm_threshold {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "orchestrator.direct_execute_threshold".into(),
                message: "must be >= orchestrator.llm_confirm_threshold".into(),
            });
        }
        if self.orchestrator.max_hops == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "orchestrator.max_hops".into(),
                message: "must be >= 1".into(),
            });
        }

        errors
    }

    pub fn has_fatal_errors(&self) -> bool {
        self.validate().iter().any(|e| e.severity == ConfigSeverity::Error)
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_no_fatal_errors() {
        let cfg = Config::default();
        assert!(!cfg.has_fatal_errors());
    }

    #[test]
    fn automation_worker_without_webhook_auth_warns() {
        let mut cfg = Config::default();
        cfg.server.role = Role::AutomationWorker;
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "automation.webhook_api_key" && e.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn drill_without_webhook_url_is_fatal() {
        let mut cfg = Config::default();
        cfg.server.role = Role::AutomationWorker;
        cfg.automation.webhook_api_key = Some("k".into());
        cfg.automation.schema_webhook_drill = true;
        assert!(cfg.has_fatal_errors());
    }

    #[test]
    fn config_error_display_has_tag_prefix() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "x".into(),
            message: "bad".into(),
        };
        assert_eq!(err.to_string(), "[ERROR] x: bad");
    }

    #[test]
    fn inverted_intent_thresholds_are_fatal() {
        let mut cfg = Config::default();
        cfg.orchestrator.direct_execute_threshold = 0.3;
        cfg.orchestrator.llm_confirm_threshold = 0.5;
        assert!(cfg.has_fatal_errors());
    }

    #[test]
    fn role_from_str_rejects_unknown() {
        let parsed: Result<Role, _> = "bogus".parse();
        assert!(parsed.is_err());
    }
}
