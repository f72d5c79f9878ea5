use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

pub const SYSTEM_INSTRUCTIONS_ENV_VAR: &str = "CODING_AGENT_SYSTEM_INSTRUCTIONS";
pub const MODEL_ENV_VAR: &str = "CODING_AGENT_MODEL";
pub const PROVIDER_ENV_VAR: &str = "CODING_AGENT_PROVIDER";
pub const LOG_DIR_ENV_VAR: &str = "CODING_AGENT_LOG_DIR";
pub const SHELL_TIMEOUT_ENV_VAR: &str = "CODING_AGENT_SHELL_TIMEOUT_SEC";

pub const DEFAULT_PROVIDER_ID: &str = "mock";
pub const DEFAULT_MODEL: &str = "mock";
pub const DEFAULT_LOG_DIR: &str = ".";
pub const DEFAULT_SYSTEM_INSTRUCTIONS: &str = "You are an AI coding agent.\n\
Your goal is to act on the user's request to complete a given task.\n\
You operate in a loop, repeatedly calling tools until the task is finished.\n\
You must explain your thought process and the steps you plan to take to solve the problem.\n\
You must use the provided tools to interact with the environment, specifically the file system.\n";

/// Startup configuration resolved from `CODING_AGENT_*` environment variables.
///
/// Blank values fall back to defaults. An unparsable shell timeout is reported
/// and ignored, so commands run without a timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    pub provider_id: String,
    pub model: String,
    pub system_instructions: String,
    pub log_dir: PathBuf,
    pub shell_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            provider_id: DEFAULT_PROVIDER_ID.to_string(),
            model: DEFAULT_MODEL.to_string(),
            system_instructions: DEFAULT_SYSTEM_INSTRUCTIONS.to_string(),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            shell_timeout: None,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            provider_id: value(PROVIDER_ENV_VAR).unwrap_or(defaults.provider_id),
            model: value(MODEL_ENV_VAR).unwrap_or(defaults.model),
            system_instructions: value(SYSTEM_INSTRUCTIONS_ENV_VAR)
                .unwrap_or(defaults.system_instructions),
            log_dir: value(LOG_DIR_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            shell_timeout: value(SHELL_TIMEOUT_ENV_VAR).and_then(|raw| parse_timeout(&raw)),
        }
    }
}

fn parse_timeout(raw: &str) -> Option<Duration> {
    match raw.parse::<u64>() {
        Ok(0) => {
            warn!(var = SHELL_TIMEOUT_ENV_VAR, "timeout must be > 0; running without one");
            None
        }
        Ok(seconds) => Some(Duration::from_secs(seconds)),
        Err(error) => {
            warn!(var = SHELL_TIMEOUT_ENV_VAR, value = raw, %error, "invalid timeout; running without one");
            None
        }
    }
}
