//! Configuration types.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::platform::ChannelRef;

/// Per-tenant settings the interview engine needs at runtime.
#[derive(Debug, Clone)]
pub struct TenantConfig {
    /// Community (guild, server, workspace) the bot serves.
    pub tenant_id: String,
    /// Role held while an interview is in progress. Granted at start and
    /// removed at completion.
    pub registration_role: Option<String>,
    /// Channel administrative commands are accepted from.
    pub command_channel: ChannelRef,
}

impl TenantConfig {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            registration_role: None,
            command_channel: ChannelRef::new("commands"),
        }
    }

    pub fn with_registration_role(mut self, role: impl Into<String>) -> Self {
        self.registration_role = Some(role.into());
        self
    }
}

const DEFAULT_START_PACING_MS: u64 = 500;
const DEFAULT_ROLE_WIPE_PACING_MS: u64 = 200;
const DEFAULT_GRACE_SECS: u64 = 30;

/// Delays between participants in bulk admin operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Between interview starts in `!start --all`.
    pub start_interval: Duration,
    /// Between members in `!clsroles`.
    pub role_wipe_interval: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            start_interval: Duration::from_millis(DEFAULT_START_PACING_MS),
            role_wipe_interval: Duration::from_millis(DEFAULT_ROLE_WIPE_PACING_MS),
        }
    }
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub tenant: TenantConfig,
    /// Question graph document loaded at startup.
    pub graph_path: PathBuf,
    /// How long a completed session lingers before it is purged.
    pub grace: Duration,
    pub pacing: PacingConfig,
    /// Port for the read-only status API. Disabled when unset.
    pub status_port: Option<u16>,
    /// Directory for the rolling log file. Console-only when unset.
    pub log_dir: Option<PathBuf>,
    /// Check text answers against their `regex` validation field.
    pub enforce_patterns: bool,
}

impl BotConfig {
    /// Build from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tenant_id = get("GATEHOUSE_TENANT_ID")
            .ok_or_else(|| ConfigError::MissingEnvVar("GATEHOUSE_TENANT_ID".to_string()))?;

        let tenant = TenantConfig {
            tenant_id,
            registration_role: get("GATEHOUSE_REGISTRATION_ROLE"),
            command_channel: ChannelRef::new(
                get("GATEHOUSE_COMMAND_CHANNEL").unwrap_or_else(|| "commands".to_string()),
            ),
        };

        let pacing = PacingConfig {
            start_interval: Duration::from_millis(parse_or(
                get("GATEHOUSE_START_PACING_MS"),
                "GATEHOUSE_START_PACING_MS",
                DEFAULT_START_PACING_MS,
            )?),
            role_wipe_interval: Duration::from_millis(parse_or(
                get("GATEHOUSE_ROLE_WIPE_PACING_MS"),
                "GATEHOUSE_ROLE_WIPE_PACING_MS",
                DEFAULT_ROLE_WIPE_PACING_MS,
            )?),
        };

        let status_port = get("GATEHOUSE_STATUS_PORT")
            .map(|v| parse::<u16>(&v, "GATEHOUSE_STATUS_PORT"))
            .transpose()?;

        Ok(Self {
            tenant,
            graph_path: get("GATEHOUSE_GRAPH_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./config/questions.json")),
            grace: Duration::from_secs(parse_or(
                get("GATEHOUSE_GRACE_SECS"),
                "GATEHOUSE_GRACE_SECS",
                DEFAULT_GRACE_SECS,
            )?),
            pacing,
            status_port,
            log_dir: get("LOG_DIR").map(PathBuf::from),
            enforce_patterns: parse_or(
                get("GATEHOUSE_ENFORCE_PATTERNS"),
                "GATEHOUSE_ENFORCE_PATTERNS",
                false,
            )?,
        })
    }
}

fn parse<T>(value: &str, key: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{value:?}: {e}"),
    })
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(v) => parse(&v, key),
        None => Ok(default),
    }
}
