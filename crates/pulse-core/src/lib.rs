//! # pulse-core
//!
//! Append-only heartbeat ledgers for operational health monitors.
//!
//! A monitor job emits a small JSON *digest*. The core turns it into a
//! [`HeartbeatRecord`] with a deterministic identity, appends it to a raw
//! NDJSON ledger exactly once, thins the raw ledger into a compacted one
//! that never loses an incident, and audits the compacted ledger against
//! the raw one. Any report can be rolled up into a digest one tier up, so
//! monitors of monitors use the same machinery.
//!
//! ## Modules
//!
//! - [`heartbeat`]: records, identity, digest-to-record builder
//! - [`ledger`]: line codec, locked append, atomic replace
//! - [`append`]: idempotent append
//! - [`window`]: trailing-window health reports
//! - [`compaction`]: tiered retention
//! - [`parity`]: raw-versus-compacted audit
//! - [`rollup`], [`pipeline`]: tier chaining
//! - [`config`]: TOML monitor profiles
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use pulse_core::{evaluate_window, LedgerScan, MonitorProfile, Status, WindowSpec};
//!
//! let line = r#"{"run_at":"2026-10-14T00:00:00Z","heartbeat_id":"hb_1","status":"ok"}"#;
//! let scan = LedgerScan::parse(&format!("{line}\n"));
//! let profile = MonitorProfile::default();
//! let report = evaluate_window(&scan, WindowSpec::Last(24), &profile, Utc::now());
//! assert_eq!(report.status, Status::Ok);
//! assert!(report.strict_fail_reasons.is_empty());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod append;
pub mod compaction;
pub mod config;
pub mod error;
pub mod flags;
pub mod heartbeat;
pub mod ledger;
pub mod parity;
pub mod pipeline;
pub mod report;
pub mod rollup;
pub mod status;
pub mod window;

#[cfg(test)]
mod testutil;

pub use append::{append_heartbeat, AppendReport};
pub use compaction::{compact, Compaction, CompactionPolicy, CompactionReport};
pub use config::{ConfigError, MonitorProfile, PulseConfig};
pub use error::PulseError;
pub use heartbeat::{load_digest, HeartbeatBuilder, HeartbeatRecord};
pub use ledger::{read_ledger, read_ledger_or_empty, replace_atomic, LedgerScan};
pub use parity::{check_parity, ParityReport};
pub use pipeline::{Chain, ChainReport, ChainRun, Stage, WindowStage};
pub use report::{HealthReport, ReportKind};
pub use rollup::Rollup;
pub use status::{RiskLevel, Status};
pub use window::{evaluate_window, WindowReport, WindowSpec};
