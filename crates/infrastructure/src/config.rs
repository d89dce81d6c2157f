//! Agent configuration: structs, parsing, and validation.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::{
    DEFAULT_BPF_PIN_DIR, DEFAULT_STATE_DIR, DEFAULT_XDP_OBJECT_PATH, RULES_SNAPSHOT_FILE,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(String),

    #[error("validation error: {field}: {message}")]
    Validation { field: String, message: String },
}

impl From<serde_yaml_ng::Error> for ConfigError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        Self::Yaml(e.to_string())
    }
}

// ── Logging knobs ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Flattened JSON for log aggregators.
    Json,
    /// Human-readable output for a terminal.
    Text,
}

// ── Top-level config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    #[serde(default)]
    pub log_format: Option<LogFormat>,

    #[serde(default)]
    pub forwarding: ForwardingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwardingConfig {
    /// Directory holding the rules snapshot.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Compiled XDP forwarding object.
    #[serde(default = "default_object_path")]
    pub xdp_object: PathBuf,

    /// bpffs directory for per-interface map pins.
    #[serde(default = "default_pin_dir")]
    pub bpf_pin_dir: PathBuf,

    /// Permit rules whose input and output interface coincide.
    #[serde(default)]
    pub allow_hairpin: bool,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_DIR)
}

fn default_object_path() -> PathBuf {
    PathBuf::from(DEFAULT_XDP_OBJECT_PATH)
}

fn default_pin_dir() -> PathBuf {
    PathBuf::from(DEFAULT_BPF_PIN_DIR)
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            xdp_object: default_object_path(),
            bpf_pin_dir: default_pin_dir(),
            allow_hairpin: false,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: None,
            log_format: None,
            forwarding: ForwardingConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load config from a YAML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        warn_if_world_readable(path);
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, path) in [
            ("forwarding.state_dir", &self.forwarding.state_dir),
            ("forwarding.bpf_pin_dir", &self.forwarding.bpf_pin_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::Validation {
                    field: field.to_string(),
                    message: "path must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Absolute path of the rules snapshot.
    pub fn rules_snapshot_path(&self) -> PathBuf {
        self.forwarding.state_dir.join(RULES_SNAPSHOT_FILE)
    }
}

/// Log a warning if the config file is readable by everyone (Unix only).
#[cfg(unix)]
fn warn_if_world_readable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = std::fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{mode:04o}"),
                "config file is world-readable — consider chmod 640 or stricter",
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_world_readable(_path: &Path) {}
