//! Monitor profiles.
//!
//! Every monitor shares one engine. A profile supplies only what differs:
//! flag names, the digest's timestamp field, the status precedence rule,
//! window ceilings and the compaction policy.
//!
//! ```toml
//! [monitors.api_latency]
//! flags = ["p95_within_threshold"]
//! precedence = "worst_in_window"
//!
//! [monitors.api_latency.thresholds]
//! max_failed = 0
//!
//! [monitors.api_latency.compaction]
//! keep_recent = 48
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compaction::CompactionPolicy;
use crate::window::{MissingFlagPolicy, PrecedenceRule, WindowThresholds};

/// Default name of the digest generation timestamp field.
pub const DEFAULT_GENERATED_AT_FIELD: &str = "generated_at";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {}", path.display())]
    Io {
        /// The config path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML is invalid or has unknown keys.
    #[error("cannot parse config")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Validation(String),

    /// `--monitor` named a profile that is not defined.
    #[error("unknown monitor profile: {0}")]
    UnknownMonitor(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PulseConfig {
    /// Monitor profiles keyed by name.
    #[serde(default)]
    pub monitors: BTreeMap<String, MonitorProfile>,
}

impl PulseConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or any profile fails
    /// validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        for (name, profile) in &mut config.monitors {
            profile.name = Some(name.clone());
            profile
                .validate()
                .map_err(|reason| ConfigError::Validation(format!("monitors.{name}: {reason}")))?;
        }
        Ok(config)
    }

    /// Resolve the profile to run with. `None` selects built-in defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::UnknownMonitor`] if `name` is not defined.
    pub fn profile(&self, name: Option<&str>) -> Result<MonitorProfile, ConfigError> {
        match name {
            None => Ok(MonitorProfile::default()),
            Some(name) => self
                .monitors
                .get(name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownMonitor(name.to_string())),
        }
    }
}

/// Everything that distinguishes one monitor from another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MonitorProfile {
    /// Profile name; filled from the table key, part of heartbeat identity.
    #[serde(skip)]
    pub name: Option<String>,
    /// Flags tracked even when a record does not carry them.
    pub flags: BTreeSet<String>,
    /// Digest field holding the generation timestamp.
    pub generated_at_field: String,
    /// Aggregate status rule for window reports.
    pub precedence: PrecedenceRule,
    /// Whether missing configured flags degrade the verdict.
    pub missing_flags: MissingFlagPolicy,
    /// Window ceilings.
    pub thresholds: WindowThresholds,
    /// Retention policy.
    pub compaction: CompactionPolicy,
}

impl Default for MonitorProfile {
    fn default() -> Self {
        Self {
            name: None,
            flags: BTreeSet::new(),
            generated_at_field: DEFAULT_GENERATED_AT_FIELD.to_string(),
            precedence: PrecedenceRule::default(),
            missing_flags: MissingFlagPolicy::default(),
            thresholds: WindowThresholds::default(),
            compaction: CompactionPolicy::default(),
        }
    }
}

impl MonitorProfile {
    /// A default profile with a name, used for derived tiers.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Check ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.generated_at_field.trim().is_empty() {
            return Err("generated_at_field must not be empty".to_string());
        }
        self.thresholds.validate()?;
        self.compaction.validate()
    }
}
