//! Process configuration captured from the Lambda execution environment.
//!
//! The environment is read exactly once, before the first runtime API call,
//! into an immutable [`Config`]. Every invocation observes the same snapshot;
//! handlers reach ad-hoc variables through [`Config::env`] rather than the
//! live process environment (which the runtime mutates for X-Ray).

use crate::error::ConfigError;
use std::collections::HashMap;

/// The variable naming the runtime API endpoint, `host:port`.
pub const RUNTIME_API_VAR: &str = "AWS_LAMBDA_RUNTIME_API";

const FUNCTION_MEMORY_VAR: &str = "AWS_LAMBDA_FUNCTION_MEMORY_SIZE";
const INITIALIZATION_TYPE_VAR: &str = "AWS_LAMBDA_INITIALIZATION_TYPE";

/// How the execution environment was provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitializationType {
    /// Sandbox created in response to an invocation.
    #[default]
    OnDemand,
    /// Sandbox pre-created by provisioned concurrency.
    ProvisionedConcurrency,
    /// Sandbox restored from a SnapStart snapshot.
    SnapStart,
}

impl InitializationType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "on-demand" => Some(Self::OnDemand),
            "provisioned-concurrency" => Some(Self::ProvisionedConcurrency),
            "snap-start" => Some(Self::SnapStart),
            _ => None,
        }
    }
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// AWS region the function runs in (`AWS_REGION`).
    pub region: String,
    /// Access key id of the execution role (`AWS_ACCESS_KEY_ID`).
    pub access_key_id: String,
    /// Secret access key of the execution role (`AWS_SECRET_ACCESS_KEY`).
    pub secret_access_key: String,
    /// Session token of the execution role (`AWS_SESSION_TOKEN`).
    pub session_token: String,
    /// Function name (`AWS_LAMBDA_FUNCTION_NAME`).
    pub function_name: String,
    /// Function version (`AWS_LAMBDA_FUNCTION_VERSION`).
    pub function_version: String,
    /// Configured memory in MB (`AWS_LAMBDA_FUNCTION_MEMORY_SIZE`).
    pub memory_size_mb: u32,
    /// How this sandbox was provisioned (`AWS_LAMBDA_INITIALIZATION_TYPE`).
    pub initialization_type: InitializationType,
    /// Handler identifier (`_HANDLER`).
    pub handler: String,
    /// CloudWatch log group (`AWS_LAMBDA_LOG_GROUP_NAME`).
    pub log_group_name: String,
    /// CloudWatch log stream (`AWS_LAMBDA_LOG_STREAM_NAME`).
    pub log_stream_name: String,
    /// Runtime API endpoint, `host:port` (`AWS_LAMBDA_RUNTIME_API`).
    pub runtime_api: String,
    env: HashMap<String, String>,
}

impl Config {
    /// Captures the process environment into a configuration snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a mandatory variable is missing or the
    /// memory size does not parse as a decimal integer. An unknown
    /// initialization type degrades to on-demand with a warning instead.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_table(std::env::vars().collect())
    }

    /// Builds a configuration from an explicit variable table.
    ///
    /// Integration tests use this to point the runtime at a local endpoint
    /// without touching the process environment.
    pub fn from_table(env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let memory_raw = required(&env, FUNCTION_MEMORY_VAR)?;
        let memory_size_mb = memory_raw
            .parse::<u32>()
            .map_err(|_| ConfigError::InvalidVar {
                name: FUNCTION_MEMORY_VAR,
                value: memory_raw,
            })?;

        let init_raw = required(&env, INITIALIZATION_TYPE_VAR)?;
        let initialization_type = InitializationType::parse(&init_raw).unwrap_or_else(|| {
            log::warn!("unknown initialization type {init_raw:?}, assuming on-demand");
            InitializationType::OnDemand
        });

        Ok(Self {
            region: required(&env, "AWS_REGION")?,
            access_key_id: required(&env, "AWS_ACCESS_KEY_ID")?,
            secret_access_key: required(&env, "AWS_SECRET_ACCESS_KEY")?,
            session_token: required(&env, "AWS_SESSION_TOKEN")?,
            function_name: required(&env, "AWS_LAMBDA_FUNCTION_NAME")?,
            function_version: required(&env, "AWS_LAMBDA_FUNCTION_VERSION")?,
            memory_size_mb,
            initialization_type,
            handler: required(&env, "_HANDLER")?,
            log_group_name: required(&env, "AWS_LAMBDA_LOG_GROUP_NAME")?,
            log_stream_name: required(&env, "AWS_LAMBDA_LOG_STREAM_NAME")?,
            runtime_api: required(&env, RUNTIME_API_VAR)?,
            env,
        })
    }

    /// Case-sensitive lookup in the environment captured at startup.
    ///
    /// Returns `None` for variables that were unset when the process
    /// started, never an empty string stand-in.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }
}

fn required(env: &HashMap<String, String>, name: &'static str) -> Result<String, ConfigError> {
    env.get(name).cloned().ok_or(ConfigError::MissingVar(name))
}
