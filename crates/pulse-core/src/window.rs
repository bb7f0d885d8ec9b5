//! Trailing-window health reports.
//!
//! A window report looks at the last N valid records of a ledger (or all of
//! them), tallies statuses and flags, and derives one aggregate status plus
//! a list of strict-mode reasons.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::MonitorProfile;
use crate::error::PulseError;
use crate::flags::{tracked_flags, FlagCounts};
use crate::ledger::{LedgerEntry, LedgerScan};
use crate::report::{pick_scalars, share_pct, HealthReport, ReportKind};
use crate::status::{RiskLevel, Status};

/// Which records a report looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowSpec {
    /// The trailing N valid records (N >= 1).
    Last(usize),
    /// Every valid record.
    Whole,
}

impl WindowSpec {
    /// Interpret a `--last` argument. `None` means the whole ledger.
    ///
    /// # Errors
    ///
    /// [`PulseError::InvalidWindow`] for values `<= 0`.
    pub fn from_arg(last: Option<i64>) -> Result<Self, PulseError> {
        match last {
            None => Ok(Self::Whole),
            Some(n) if n <= 0 => Err(PulseError::InvalidWindow(n)),
            Some(n) => usize::try_from(n)
                .map(Self::Last)
                .map_err(|_| PulseError::InvalidWindow(n)),
        }
    }

    /// The `last` value to echo in reports.
    #[must_use]
    pub const fn last(self) -> Option<usize> {
        match self {
            Self::Last(n) => Some(n),
            Self::Whole => None,
        }
    }

    /// Select the window's records from `scan`.
    ///
    /// The window's line span starts at the first selected record, or at the
    /// start of the file when every valid record is selected; malformed
    /// lines inside the span belong to the window.
    #[must_use]
    pub fn select(self, scan: &LedgerScan) -> WindowSelection<'_> {
        let total = scan.len();
        let take = match self {
            Self::Last(n) => n.min(total),
            Self::Whole => total,
        };
        let start = total - take;
        let entries = &scan.entries[start..];
        let span_start = if start == 0 { 0 } else { entries[0].line_no };
        WindowSelection {
            entries,
            malformed_in_window: scan.malformed_from(span_start),
        }
    }
}

/// The records a window covers.
#[derive(Debug, Clone, Copy)]
pub struct WindowSelection<'a> {
    /// Selected records, oldest first.
    pub entries: &'a [LedgerEntry],
    /// Malformed lines inside the window's span.
    pub malformed_in_window: usize,
}

/// How the aggregate status is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceRule {
    /// Only the latest record (or a hard ceiling) can make the window
    /// `failed`; older failures degrade it.
    #[default]
    LatestFirst,
    /// Any `failed` record in the window makes it `failed`.
    WorstInWindow,
}

/// Whether absent configured flags count against the verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingFlagPolicy {
    /// Missing telemetry degrades the window.
    #[default]
    Degrade,
    /// Missing telemetry is reported but does not change the status.
    Ignore,
}

/// Hard ceilings. Exceeding any of them fails the window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WindowThresholds {
    /// Maximum `failed` records.
    pub max_failed: Option<u64>,
    /// Maximum `degraded` records.
    pub max_degraded: Option<u64>,
    /// Maximum share of `failed` records, in percent.
    pub max_failed_pct: Option<f64>,
    /// Maximum share of `degraded` records, in percent.
    pub max_degraded_pct: Option<f64>,
    /// Maximum violations of any single flag.
    pub max_flag_violations: Option<u64>,
}

impl WindowThresholds {
    /// Check percentage ranges.
    ///
    /// # Errors
    ///
    /// Returns a description of the first out-of-range value.
    pub fn validate(&self) -> Result<(), String> {
        for (name, value) in [
            ("max_failed_pct", self.max_failed_pct),
            ("max_degraded_pct", self.max_degraded_pct),
        ] {
            if let Some(pct) = value {
                if !pct.is_finite() || !(0.0..=100.0).contains(&pct) {
                    return Err(format!("{name} must be within 0..=100, got {pct}"));
                }
            }
        }
        Ok(())
    }
}

/// Per-status tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    /// `ok` records.
    pub ok: u64,
    /// `degraded` records.
    pub degraded: u64,
    /// `failed` records.
    pub failed: u64,
}

impl StatusCounts {
    fn observe(&mut self, status: Status) {
        match status {
            Status::Ok => self.ok += 1,
            Status::Degraded => self.degraded += 1,
            Status::Failed => self.failed += 1,
        }
    }
}

/// Health summary of a window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    /// Always [`ReportKind::Window`].
    pub report: ReportKind,
    /// Evaluation time.
    pub generated_at: DateTime<Utc>,
    /// `run_at` of the latest record in the window.
    pub as_of: Option<DateTime<Utc>>,
    /// Monitor profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    /// Ledger path, when read from a file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger: Option<String>,
    /// Requested window size; `null` for the whole ledger.
    pub last: Option<usize>,
    /// Valid records in the ledger.
    pub entries_total: usize,
    /// Valid records in the window.
    pub entries_in_window: usize,
    /// Status tallies over the window.
    pub status_counts: StatusCounts,
    /// Flag tallies over the window.
    pub flags: BTreeMap<String, FlagCounts>,
    /// Malformed lines inside the window's span.
    pub malformed_entries_in_window: usize,
    /// Malformed lines anywhere in the ledger.
    pub malformed_entries_total: usize,
    /// Identity of the latest record in the window.
    pub latest_heartbeat_id: Option<String>,
    /// Status of the latest record in the window.
    pub latest_status: Option<Status>,
    /// Share of `failed` records, in percent.
    pub failed_pct: f64,
    /// Share of `degraded` records, in percent.
    pub degraded_pct: f64,
    /// Rule used for `status`.
    pub precedence: PrecedenceRule,
    /// Aggregate status.
    pub status: Status,
    /// Risk summary of `status`.
    pub risk_level: RiskLevel,
    /// Number of strict reasons.
    pub strict_fail_count: usize,
    /// Strict-mode reasons.
    pub strict_fail_reasons: Vec<String>,
}

impl WindowReport {
    pub(crate) fn set_reasons(&mut self, reasons: Vec<String>) {
        self.strict_fail_count = reasons.len();
        self.strict_fail_reasons = reasons;
    }
}

/// Evaluate the window `spec` over `scan` under `profile`.
#[must_use]
pub fn evaluate_window(
    scan: &LedgerScan,
    spec: WindowSpec,
    profile: &MonitorProfile,
    now: DateTime<Utc>,
) -> WindowReport {
    let selection = spec.select(scan);
    let window: Vec<_> = selection.entries.iter().map(|entry| &entry.record).collect();
    let flag_names = tracked_flags(&profile.flags, window.iter().copied());

    let mut status_counts = StatusCounts::default();
    let mut flags: BTreeMap<String, FlagCounts> = flag_names
        .iter()
        .map(|name| (name.clone(), FlagCounts::default()))
        .collect();
    for record in &window {
        status_counts.observe(record.status);
        for (name, counts) in &mut flags {
            counts.observe(record.flag(name));
        }
    }

    let latest = window.last().copied();
    let entries_in_window = window.len();
    let failed_pct = share_pct(usize_of(status_counts.failed), entries_in_window);
    let degraded_pct = share_pct(usize_of(status_counts.degraded), entries_in_window);

    let mut reasons = Vec::new();
    let mut hard_failure = false;

    match latest.map(|record| record.status) {
        Some(Status::Failed) => reasons.push("latest_status_failed".to_string()),
        Some(Status::Degraded) => reasons.push("latest_status_degraded".to_string()),
        _ => {},
    }

    let t = &profile.thresholds;
    let ceilings = [
        ("max_failed_exceeded", t.max_failed.is_some_and(|max| status_counts.failed > max)),
        (
            "max_degraded_exceeded",
            t.max_degraded.is_some_and(|max| status_counts.degraded > max),
        ),
        ("max_failed_pct_exceeded", t.max_failed_pct.is_some_and(|max| failed_pct > max)),
        (
            "max_degraded_pct_exceeded",
            t.max_degraded_pct.is_some_and(|max| degraded_pct > max),
        ),
    ];
    for (reason, exceeded) in ceilings {
        if exceeded {
            hard_failure = true;
            reasons.push(reason.to_string());
        }
    }
    if let Some(max) = t.max_flag_violations {
        for (name, counts) in &flags {
            if counts.violated > max {
                hard_failure = true;
                reasons.push(format!("{name}_violations_exceeded"));
            }
        }
    }
    if selection.malformed_in_window > 0 {
        reasons.push("malformed_entries_present".to_string());
    }
    if entries_in_window == 0 {
        reasons.push("no_entries_in_window".to_string());
    }

    let status = aggregate_status(&AggregateInputs {
        precedence: profile.precedence,
        latest: latest.map(|record| record.status),
        counts: status_counts,
        hard_failure,
        any_violation: flags.values().any(|counts| counts.violated > 0),
        missing_configured: profile.missing_flags == MissingFlagPolicy::Degrade
            && missing_configured(&profile.flags, &flags),
        malformed_in_window: selection.malformed_in_window,
        entries_in_window,
    });

    let mut report = WindowReport {
        report: ReportKind::Window,
        generated_at: now,
        as_of: latest.map(|record| record.run_at),
        monitor: profile.name.clone(),
        ledger: None,
        last: spec.last(),
        entries_total: scan.len(),
        entries_in_window,
        status_counts,
        flags,
        malformed_entries_in_window: selection.malformed_in_window,
        malformed_entries_total: scan.malformed_lines.len(),
        latest_heartbeat_id: latest.map(|record| record.heartbeat_id.clone()),
        latest_status: latest.map(|record| record.status),
        failed_pct,
        degraded_pct,
        precedence: profile.precedence,
        status,
        risk_level: status.risk_level(),
        strict_fail_count: 0,
        strict_fail_reasons: Vec::new(),
    };
    report.set_reasons(reasons);
    report
}

struct AggregateInputs {
    precedence: PrecedenceRule,
    latest: Option<Status>,
    counts: StatusCounts,
    hard_failure: bool,
    any_violation: bool,
    missing_configured: bool,
    malformed_in_window: usize,
    entries_in_window: usize,
}

fn aggregate_status(inputs: &AggregateInputs) -> Status {
    let failed = inputs.hard_failure
        || inputs.latest == Some(Status::Failed)
        || (inputs.precedence == PrecedenceRule::WorstInWindow && inputs.counts.failed > 0);
    if failed {
        return Status::Failed;
    }
    let degraded = inputs.counts.failed > 0
        || inputs.counts.degraded > 0
        || inputs.any_violation
        || inputs.missing_configured
        || inputs.malformed_in_window > 0
        || inputs.entries_in_window == 0;
    if degraded {
        Status::Degraded
    } else {
        Status::Ok
    }
}

fn missing_configured(configured: &BTreeSet<String>, flags: &BTreeMap<String, FlagCounts>) -> bool {
    configured
        .iter()
        .any(|name| flags.get(name).is_some_and(|counts| counts.missing > 0))
}

fn usize_of(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

impl HealthReport for WindowReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Window
    }

    fn status(&self) -> Status {
        self.status
    }

    fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    fn as_of(&self) -> Option<DateTime<Utc>> {
        self.as_of
    }

    fn strict_fail_reasons(&self) -> &[String] {
        &self.strict_fail_reasons
    }

    fn rollup_scalars(&self) -> Map<String, Value> {
        serde_json::to_value(self)
            .map(|value| pick_scalars(&value, ReportKind::Window.rollup_fields()))
            .unwrap_or_default()
    }
}
