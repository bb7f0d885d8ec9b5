//! Subcommands.
//!
//! Every `run_*` function prints one JSON object and returns an exit code
//! from [`exit_codes`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use clap::Args;
use pulse_core::{MonitorProfile, PulseConfig, PulseError};
use tracing::debug;

pub mod append;
pub mod build;
pub mod chain;
pub mod compact;
pub mod output;
pub mod parity;
pub mod rollup;
pub mod window;

/// Config file picked up from the working directory when `--config` is not
/// given.
pub const DEFAULT_CONFIG_FILE: &str = "pulse.toml";

/// Exit codes shared by every subcommand.
pub mod exit_codes {
    /// Success, or non-strict pass.
    pub const SUCCESS: u8 = 0;
    /// Usage error, missing input, or invalid configuration.
    pub const INVALID_INPUT: u8 = 2;
    /// Unexpected runtime error; best-effort JSON is still printed.
    pub const RUNTIME_ERROR: u8 = 3;
    /// Strict mode and the report carries reasons.
    pub const STRICT_FAILURE: u8 = 4;
}

/// Flags accepted by every subcommand.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Exit 4 when the report carries strict-fail reasons
    #[arg(long, global = true)]
    pub strict: bool,

    /// Also write the JSON report to this path (atomic replace)
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Path to the monitor configuration file [default: pulse.toml if present]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Monitor profile to use from the configuration file
    #[arg(long, global = true)]
    pub monitor: Option<String>,

    /// Override the evaluation clock (RFC 3339)
    #[arg(long, global = true)]
    pub now: Option<DateTime<Utc>>,

    /// Log filter for stderr (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,
}

/// Resolved per-invocation settings.
#[derive(Debug, Clone)]
pub struct Session {
    /// Strict mode.
    pub strict: bool,
    /// Report copy destination.
    pub out: Option<PathBuf>,
    /// Selected monitor profile.
    pub profile: MonitorProfile,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

impl Session {
    /// Load configuration and resolve the monitor profile.
    ///
    /// # Errors
    ///
    /// Returns a config error if an explicit config file is missing, any
    /// config file is invalid, or `--monitor` names an unknown profile.
    pub fn load(global: &GlobalArgs) -> Result<Self, PulseError> {
        let config = match &global.config {
            Some(path) => PulseConfig::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                PulseConfig::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            },
            None => PulseConfig::default(),
        };
        let profile = config.profile(global.monitor.as_deref())?;
        debug!(monitor = ?profile.name, "profile resolved");
        Ok(Self {
            strict: global.strict,
            out: global.out.clone(),
            profile,
            now: global.now.unwrap_or_else(Utc::now),
        })
    }
}

/// Display form of a path for reports.
pub fn display(path: &Path) -> String {
    path.display().to_string()
}
