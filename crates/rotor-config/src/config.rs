use anyhow::{Context, Result};
use rotor_core::RotorError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::paths;
use crate::rules::RulesConfig;

/// How the active credential reaches the transfer process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMode {
    /// Append `<credential_flag> <file>` to the command line.
    #[default]
    Runtime,
    /// Rewrite `<key> = <file>` in a section of the transfer tool's config.
    Config,
}

/// Full supervisor configuration, loaded once and passed by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotorConfig {
    /// Directory scanned for `*.json` credential files.
    #[serde(default)]
    pub credentials_dir: PathBuf,
    #[serde(default = "paths::default_lock_path")]
    pub lock_path: PathBuf,
    #[serde(default = "paths::default_state_path")]
    pub state_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub rules: RulesConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    #[serde(default = "default_subcommand")]
    pub subcommand: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub destination: String,
    #[serde(default = "default_extra_args")]
    pub extra_args: Vec<String>,
    #[serde(default = "default_rc_addr")]
    pub rc_addr: String,
    #[serde(default = "default_rc_port")]
    pub rc_port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rc_user: Option<String>,
    /// Never serialized in clear text; handed to the transfer through the
    /// environment, not argv.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "redact_secret"
    )]
    pub rc_pass: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RotationConfig {
    #[serde(default)]
    pub mode: RotationMode,
    /// Flag used by `runtime` mode.
    #[serde(default = "default_credential_flag")]
    pub credential_flag: String,
    /// Transfer tool config file rewritten by `config` mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rclone_config: Option<PathBuf>,
    /// Section rewritten by `config` mode; defaults to the destination remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default = "default_section_key")]
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TimingConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Wait after spawn before the first poll; the RC server needs a moment.
    #[serde(default = "default_startup_grace_secs")]
    pub startup_grace_secs: u64,
    /// Wait after a kill before the next spawn.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Values supplied on the command line; each one replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub credentials_dir: Option<PathBuf>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub log_file: Option<PathBuf>,
    pub state_path: Option<PathBuf>,
    pub lock_path: Option<PathBuf>,
}

const REDACTED: &str = "<redacted>";

fn redact_secret<S: serde::Serializer>(value: &Option<String>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(_) => s.serialize_some(REDACTED),
        None => s.serialize_none(),
    }
}

fn default_binary() -> String {
    "rclone".to_string()
}

fn default_subcommand() -> String {
    "move".to_string()
}

fn default_extra_args() -> Vec<String> {
    vec![
        "--drive-server-side-across-configs".to_string(),
        "-v".to_string(),
    ]
}

fn default_rc_addr() -> String {
    "127.0.0.1".to_string()
}

fn default_rc_port() -> u16 {
    5572
}

fn default_credential_flag() -> String {
    "--drive-service-account-file".to_string()
}

fn default_section_key() -> String {
    "service_account_file".to_string()
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_startup_grace_secs() -> u64 {
    10
}

fn default_cooldown_secs() -> u64 {
    10
}

fn default_max_poll_failures() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            subcommand: default_subcommand(),
            source: String::new(),
            destination: String::new(),
            extra_args: default_extra_args(),
            rc_addr: default_rc_addr(),
            rc_port: default_rc_port(),
            rc_user: None,
            rc_pass: None,
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            mode: RotationMode::default(),
            credential_flag: default_credential_flag(),
            rclone_config: None,
            section: None,
            key: default_section_key(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            startup_grace_secs: default_startup_grace_secs(),
            cooldown_secs: default_cooldown_secs(),
            max_poll_failures: default_max_poll_failures(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self {
            credentials_dir: PathBuf::new(),
            lock_path: paths::default_lock_path(),
            state_path: paths::default_state_path(),
            log_file: None,
            transfer: TransferConfig::default(),
            rotation: RotationConfig::default(),
            timing: TimingConfig::default(),
            rules: RulesConfig::default(),
        }
    }
}

impl TransferConfig {
    /// Remote name of the destination (`GDrive` for `GDrive:/tmp`).
    ///
    /// Returns `None` for plain local paths.
    pub fn destination_remote(&self) -> Option<&str> {
        let (remote, _) = self.destination.split_once(':')?;
        if remote.is_empty() || remote.contains('/') {
            return None;
        }
        Some(remote)
    }

    /// Base URL of the statistics endpoint served by the transfer process.
    pub fn rc_url(&self) -> String {
        format!("http://{}:{}", self.rc_addr, self.rc_port)
    }
}

impl RotationConfig {
    pub fn rclone_config_path(&self) -> PathBuf {
        self.rclone_config
            .clone()
            .unwrap_or_else(paths::default_rclone_config)
    }

    pub fn resolved_section(&self, transfer: &TransferConfig) -> Option<String> {
        self.section
            .clone()
            .or_else(|| transfer.destination_remote().map(str::to_string))
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RotorConfig {
    /// Load configuration from `path`, or from the default location.
    ///
    /// An explicit path must exist. A missing default file yields the
    /// built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => match paths::default_config_path() {
                Some(default_path) if default_path.exists() => Self::load_from(&default_path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            RotorError::InvalidConfig {
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    pub fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(dir) = overrides.credentials_dir {
            self.credentials_dir = dir;
        }
        if let Some(source) = overrides.source {
            self.transfer.source = source;
        }
        if let Some(destination) = overrides.destination {
            self.transfer.destination = destination;
        }
        if let Some(log_file) = overrides.log_file {
            self.log_file = Some(log_file);
        }
        if let Some(state_path) = overrides.state_path {
            self.state_path = state_path;
        }
        if let Some(lock_path) = overrides.lock_path {
            self.lock_path = lock_path;
        }
    }

    /// Check everything the supervisor loop relies on.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| -> anyhow::Error {
            RotorError::InvalidConfig {
                reason: reason.to_string(),
            }
            .into()
        };

        if self.credentials_dir.as_os_str().is_empty() {
            return Err(invalid("credentials_dir is not set"));
        }
        if self.transfer.binary.trim().is_empty() {
            return Err(invalid("transfer.binary must not be empty"));
        }
        if self.transfer.source.is_empty() || self.transfer.destination.is_empty() {
            return Err(invalid("transfer.source and transfer.destination are required"));
        }
        if self.rules.quorum == 0 {
            return Err(invalid("rules.quorum must be at least 1"));
        }
        if self.rules.stalled.threshold == 0 {
            return Err(invalid("rules.stalled.threshold must be at least 1"));
        }
        if self.rules.rate_limit.enabled && self.rules.rate_limit.markers.is_empty() {
            return Err(invalid("rules.rate_limit.markers must not be empty"));
        }
        if self.timing.poll_interval_secs == 0 {
            return Err(invalid("timing.poll_interval_secs must be greater than 0"));
        }
        if self.timing.max_poll_failures == 0 {
            return Err(invalid("timing.max_poll_failures must be at least 1"));
        }
        if self.rotation.mode == RotationMode::Config
            && self.rotation.resolved_section(&self.transfer).is_none()
        {
            return Err(invalid(
                "rotation.section is required when the destination is not a remote",
            ));
        }

        if self.rules.is_unreachable() {
            warn!(
                quorum = self.rules.quorum,
                enabled = self.rules.enabled_rules().len(),
                "Quorum exceeds enabled rules; credentials will never rotate"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
