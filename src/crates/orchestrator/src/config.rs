//! Environment-driven configuration
//!
//! All recognized options come from environment variables; there is no config
//! file. Unknown checkpointer modes are logged and treated as `off`.

use crate::{OrchestratorError, Result};

/// Checkpointer backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointerMode {
    Memory,
    Sqlite,
    Postgres,
    Off,
}

impl CheckpointerMode {
    /// Parse a mode string; unknown values fall back to `Off` with a warning
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "" | "sqlite" => CheckpointerMode::Sqlite,
            "memory" => CheckpointerMode::Memory,
            "postgres" | "postgresql" => CheckpointerMode::Postgres,
            "off" | "none" | "disabled" => CheckpointerMode::Off,
            other => {
                tracing::warn!("Unknown checkpointer mode '{other}', disabling checkpointer");
                CheckpointerMode::Off
            }
        }
    }
}

/// Tool policy enforcement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolPolicyMode {
    Off,
    LogOnly,
    Enforce,
}

impl ToolPolicyMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "off" => ToolPolicyMode::Off,
            "enforce" => ToolPolicyMode::Enforce,
            _ => ToolPolicyMode::LogOnly,
        }
    }
}

/// Process configuration resolved from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    /// Core database URL; must be a SQLite URL
    pub database_url: String,

    /// Bind address for the HTTP server
    pub host: String,
    pub port: u16,

    /// Whether the Run API is exposed (404s when false)
    pub run_api_enabled: bool,

    /// Graph checkpointer backend and optional URL override
    pub checkpointer_mode: CheckpointerMode,
    pub checkpoint_url: Option<String>,

    /// Tool policy engine
    pub tool_policy_enabled: bool,
    pub tool_policy_mode: ToolPolicyMode,
    pub tool_policy_allowed_cmd_prefixes: Vec<String>,
    pub tool_policy_large_output_bytes: usize,

    /// CORS
    pub cors_allow_origins: Vec<String>,
    pub cors_allow_credentials: bool,

    /// Graph node feature toggles
    pub aesthetic_scoring_enabled: bool,
    pub verify_gate_enabled: bool,
    pub style_extractor_enabled: bool,

    /// Parallel executor tunables
    pub max_concurrent_tasks: usize,
    pub task_timeout_seconds: f64,
    pub task_timeout_minutes: i64,
    pub task_cleanup_interval_seconds: f64,

    /// Runs still `running` older than this are considered dead on startup
    pub run_staleness_minutes: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite:siteforge.db".to_string(),
            host: "127.0.0.1".to_string(),
            port: 8080,
            run_api_enabled: true,
            checkpointer_mode: CheckpointerMode::Sqlite,
            checkpoint_url: None,
            tool_policy_enabled: true,
            tool_policy_mode: ToolPolicyMode::LogOnly,
            tool_policy_allowed_cmd_prefixes: default_cmd_prefixes(),
            tool_policy_large_output_bytes: 100 * 1024,
            cors_allow_origins: vec!["*".to_string()],
            cors_allow_credentials: false,
            aesthetic_scoring_enabled: true,
            verify_gate_enabled: true,
            style_extractor_enabled: true,
            max_concurrent_tasks: 5,
            task_timeout_seconds: 600.0,
            task_timeout_minutes: 30,
            task_cleanup_interval_seconds: 60.0,
            run_staleness_minutes: 30,
        }
    }
}

fn default_cmd_prefixes() -> Vec<String> {
    ["npm", "npx", "node", "python", "pip", "git", "ls", "cat", "echo", "mkdir", "cp"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_string(key) {
        Some(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        None => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_string(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|value| {
        value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

impl Settings {
    /// Load settings from the environment
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let mut settings = Settings {
            database_url: env_string("DATABASE_URL").unwrap_or(defaults.database_url),
            host: env_string("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port),
            run_api_enabled: env_bool("RUN_API_ENABLED", defaults.run_api_enabled),
            checkpointer_mode: env_string("FLOWGRAPH_CHECKPOINTER")
                .map(|value| CheckpointerMode::parse(&value))
                .unwrap_or(defaults.checkpointer_mode),
            checkpoint_url: env_string("FLOWGRAPH_CHECKPOINT_URL"),
            tool_policy_enabled: env_bool("TOOL_POLICY_ENABLED", defaults.tool_policy_enabled),
            tool_policy_mode: env_string("TOOL_POLICY_MODE")
                .map(|value| ToolPolicyMode::parse(&value))
                .unwrap_or(defaults.tool_policy_mode),
            tool_policy_allowed_cmd_prefixes: env_list("TOOL_POLICY_ALLOWED_CMD_PREFIXES")
                .unwrap_or(defaults.tool_policy_allowed_cmd_prefixes),
            tool_policy_large_output_bytes: env_parse(
                "TOOL_POLICY_LARGE_OUTPUT_BYTES",
                defaults.tool_policy_large_output_bytes,
            )
            .max(1024),
            cors_allow_origins: env_list("CORS_ALLOW_ORIGINS").unwrap_or(defaults.cors_allow_origins),
            cors_allow_credentials: env_bool(
                "CORS_ALLOW_CREDENTIALS",
                defaults.cors_allow_credentials,
            ),
            aesthetic_scoring_enabled: env_bool(
                "AESTHETIC_SCORING_ENABLED",
                defaults.aesthetic_scoring_enabled,
            ),
            verify_gate_enabled: env_bool("VERIFY_GATE_ENABLED", defaults.verify_gate_enabled),
            style_extractor_enabled: env_bool(
                "STYLE_EXTRACTOR_ENABLED",
                defaults.style_extractor_enabled,
            ),
            max_concurrent_tasks: env_parse("MAX_CONCURRENT_TASKS", defaults.max_concurrent_tasks),
            task_timeout_seconds: env_parse("TASK_TIMEOUT_SECONDS", defaults.task_timeout_seconds),
            task_timeout_minutes: env_parse("TASK_TIMEOUT_MINUTES", defaults.task_timeout_minutes),
            task_cleanup_interval_seconds: env_parse(
                "TASK_CLEANUP_INTERVAL_SECONDS",
                defaults.task_cleanup_interval_seconds,
            ),
            run_staleness_minutes: env_parse(
                "RUN_STALENESS_MINUTES",
                defaults.run_staleness_minutes,
            ),
        };

        // A wildcard origin with credentials is not a deliverable CORS setup;
        // downgrade rather than fail.
        if settings.cors_allow_credentials
            && settings.cors_allow_origins.iter().any(|origin| origin == "*")
        {
            tracing::warn!("CORS wildcard origin with credentials; disabling credentials");
            settings.cors_allow_credentials = false;
        }

        settings
    }

    /// Validate the core database URL (SQLite only; see DESIGN.md)
    pub fn validate(&self) -> Result<()> {
        if !self.database_url.starts_with("sqlite:") {
            return Err(OrchestratorError::Config(format!(
                "DATABASE_URL must be a sqlite URL, got '{}'",
                self.database_url
            )));
        }
        Ok(())
    }

    /// The URL the checkpointer should use
    pub fn resolved_checkpoint_url(&self) -> &str {
        self.checkpoint_url.as_deref().unwrap_or(&self.database_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpointer_mode_parse() {
        assert_eq!(CheckpointerMode::parse("memory"), CheckpointerMode::Memory);
        assert_eq!(CheckpointerMode::parse("SQLite"), CheckpointerMode::Sqlite);
        assert_eq!(
            CheckpointerMode::parse("postgresql"),
            CheckpointerMode::Postgres
        );
        assert_eq!(CheckpointerMode::parse("off"), CheckpointerMode::Off);
        assert_eq!(CheckpointerMode::parse("carrier-pigeon"), CheckpointerMode::Off);
    }

    #[test]
    fn test_default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_concurrent_tasks, 5);
        assert_eq!(settings.task_timeout_seconds, 600.0);
    }

    #[test]
    fn test_postgres_core_db_rejected() {
        let settings = Settings {
            database_url: "postgres://localhost/siteforge".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_resolved_checkpoint_url_falls_back() {
        let mut settings = Settings::default();
        assert_eq!(settings.resolved_checkpoint_url(), "sqlite:siteforge.db");
        settings.checkpoint_url = Some("sqlite:checkpoints.db".to_string());
        assert_eq!(settings.resolved_checkpoint_url(), "sqlite:checkpoints.db");
    }
}
