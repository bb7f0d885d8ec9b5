//! Raw-versus-compacted parity.
//!
//! Verifies that everything a raw window says about incidents and flag
//! violations can still be seen in the compacted ledger.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::MonitorProfile;
use crate::flags::FlagState;
use crate::heartbeat::HeartbeatRecord;
use crate::ledger::LedgerScan;
use crate::report::{coverage_pct, pick_scalars, HealthReport, ReportKind};
use crate::status::{RiskLevel, Status};
use crate::window::{evaluate_window, WindowSpec};

/// Violation counts for one flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagParity {
    /// `false` readings in the raw window.
    pub raw_violations: usize,
    /// `false` readings among the compacted copies of those records.
    pub compacted_violations: usize,
    /// `raw_violations - compacted_violations`, floored at zero.
    pub missing_in_compacted: usize,
}

/// Outcome of a parity check.
#[derive(Debug, Clone, Serialize)]
pub struct ParityReport {
    /// Always [`ReportKind::Parity`].
    pub report: ReportKind,
    /// Evaluation time.
    pub generated_at: DateTime<Utc>,
    /// `run_at` of the latest raw record in the window.
    pub as_of: Option<DateTime<Utc>>,
    /// Monitor profile name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    /// Raw ledger path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    /// Compacted ledger path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compacted: Option<String>,
    /// Requested window size; `null` for the whole ledger.
    pub last: Option<usize>,
    /// Raw records in the window.
    pub entries_in_window: usize,
    /// Valid records in the compacted ledger.
    pub compacted_entries_total: usize,
    /// Window records found in the compacted ledger.
    pub matched_in_compacted: usize,
    /// Window records with `status != ok`.
    pub incidents_in_window: usize,
    /// Of those, found in the compacted ledger.
    pub incidents_in_compacted: usize,
    /// Identity of the latest raw record.
    pub latest_raw_heartbeat_id: Option<String>,
    /// The latest raw record is present in the compacted ledger.
    pub latest_present_ok: bool,
    /// Every window incident is present in the compacted ledger.
    pub incident_parity_ok: bool,
    /// No flag's violations are under-reported.
    pub flag_parity_ok: bool,
    /// The compacted ledger has no malformed lines. Informational.
    pub malformed_parity_ok: bool,
    /// Malformed lines in the compacted ledger.
    pub compacted_malformed_lines: usize,
    /// Per-flag violation counts.
    pub flags: BTreeMap<String, FlagParity>,
    /// `<flag>_violations_missing_in_compacted` counters.
    #[serde(flatten)]
    pub flag_counters: BTreeMap<String, usize>,
    /// Share of window records present in compacted, in percent.
    pub coverage_pct: f64,
    /// Share of window incidents present in compacted, in percent.
    pub incident_coverage_pct: f64,
    /// Status of the raw window on its own.
    pub raw_window_status: Status,
    /// Reasons of the raw window on its own.
    pub raw_window_reasons: Vec<String>,
    /// `max(raw_window_status, parity status)`.
    pub status: Status,
    /// Risk summary of `status`.
    pub risk_level: RiskLevel,
    /// Number of strict reasons.
    pub strict_fail_count: usize,
    /// Parity reasons.
    pub strict_fail_reasons: Vec<String>,
}

/// Check that the compacted ledger preserves what the raw window `spec`
/// shows.
#[must_use]
pub fn check_parity(
    raw: &LedgerScan,
    compacted: &LedgerScan,
    spec: WindowSpec,
    profile: &MonitorProfile,
    now: DateTime<Utc>,
) -> ParityReport {
    let window_report = evaluate_window(raw, spec, profile, now);
    let selection = spec.select(raw);
    let by_id: HashMap<&str, &HeartbeatRecord> = compacted
        .records()
        .map(|record| (record.heartbeat_id.as_str(), record))
        .collect();

    let mut matched = 0;
    let mut incidents_in_window = 0;
    let mut incidents_in_compacted = 0;
    let mut flags: BTreeMap<String, FlagParity> = window_report
        .flags
        .keys()
        .map(|name| (name.clone(), FlagParity::default()))
        .collect();

    for entry in selection.entries {
        let record = &entry.record;
        let copy = by_id.get(record.heartbeat_id.as_str()).copied();
        if copy.is_some() {
            matched += 1;
        }
        if record.status.is_incident() {
            incidents_in_window += 1;
            if copy.is_some() {
                incidents_in_compacted += 1;
            }
        }
        for (name, parity) in &mut flags {
            if record.flag(name) == FlagState::Violated {
                parity.raw_violations += 1;
                if copy.is_some_and(|copy| copy.flag(name) == FlagState::Violated) {
                    parity.compacted_violations += 1;
                }
            }
        }
    }

    let latest = raw.latest();
    let latest_present_ok =
        latest.map_or(true, |record| by_id.contains_key(record.heartbeat_id.as_str()));
    let incident_parity_ok = incidents_in_compacted == incidents_in_window;

    let mut reasons = Vec::new();
    if !latest_present_ok {
        reasons.push("latest_raw_missing_in_compacted".to_string());
    }
    if !incident_parity_ok {
        reasons.push("incident_missing_in_compacted".to_string());
    }
    let mut flag_counters = BTreeMap::new();
    let mut flag_parity_ok = true;
    for (name, parity) in &mut flags {
        parity.missing_in_compacted = parity
            .raw_violations
            .saturating_sub(parity.compacted_violations);
        flag_counters.insert(
            format!("{name}_violations_missing_in_compacted"),
            parity.missing_in_compacted,
        );
        if parity.compacted_violations < parity.raw_violations {
            flag_parity_ok = false;
            reasons.push(format!("{name}_violations_underreported_in_compacted"));
            if parity.compacted_violations == 0 {
                reasons.push(format!("{name}_violations_missing_in_compacted"));
            }
        }
    }

    let parity_status = if !latest_present_ok || !incident_parity_ok {
        Status::Failed
    } else if !flag_parity_ok {
        Status::Degraded
    } else {
        Status::Ok
    };
    let status = window_report.status.max(parity_status);
    debug!(%status, matched, entries_in_window = selection.entries.len(), "parity checked");

    ParityReport {
        report: ReportKind::Parity,
        generated_at: now,
        as_of: window_report.as_of,
        monitor: profile.name.clone(),
        raw: None,
        compacted: None,
        last: spec.last(),
        entries_in_window: selection.entries.len(),
        compacted_entries_total: compacted.len(),
        matched_in_compacted: matched,
        incidents_in_window,
        incidents_in_compacted,
        latest_raw_heartbeat_id: latest.map(|record| record.heartbeat_id.clone()),
        latest_present_ok,
        incident_parity_ok,
        flag_parity_ok,
        malformed_parity_ok: compacted.malformed_lines.is_empty(),
        compacted_malformed_lines: compacted.malformed_lines.len(),
        flags,
        flag_counters,
        coverage_pct: coverage_pct(matched, selection.entries.len()),
        incident_coverage_pct: coverage_pct(incidents_in_compacted, incidents_in_window),
        raw_window_status: window_report.status,
        raw_window_reasons: window_report.strict_fail_reasons,
        status,
        risk_level: status.risk_level(),
        strict_fail_count: reasons.len(),
        strict_fail_reasons: reasons,
    }
}

impl HealthReport for ParityReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Parity
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
            .map(|value| pick_scalars(&value, ReportKind::Parity.rollup_fields()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testutil::{ledger_text, rec, rec_with_flag};

    const FLAG: &str = "p95_within_threshold";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn scan(records: &[HeartbeatRecord]) -> LedgerScan {
        LedgerScan::parse(&ledger_text(records))
    }

    #[test]
    fn identical_ledgers_are_in_parity() {
        let records = [
            rec(0, Status::Ok),
            rec_with_flag(1, Status::Degraded, FLAG, false),
            rec(2, Status::Ok),
        ];
        let report = check_parity(
            &scan(&records),
            &scan(&records),
            WindowSpec::Whole,
            &MonitorProfile::default(),
            now(),
        );
        assert!(report.latest_present_ok);
        assert!(report.incident_parity_ok);
        assert!(report.flag_parity_ok);
        assert!(report.strict_fail_reasons.is_empty());
        assert!((report.coverage_pct - 100.0).abs() < f64::EPSILON);
        // the raw window itself is degraded by the incident
        assert_eq!(report.status, Status::Degraded);
    }

    #[test]
    fn missing_incident_and_flag() {
        let raw = [
            rec(0, Status::Ok),
            rec_with_flag(1, Status::Failed, FLAG, false),
            rec(2, Status::Ok),
        ];
        let compacted = [rec(2, Status::Ok)];
        let report = check_parity(
            &scan(&raw),
            &scan(&compacted),
            WindowSpec::Last(3),
            &MonitorProfile::default(),
            now(),
        );
        assert!(report.latest_present_ok);
        assert!(!report.incident_parity_ok);
        assert_eq!(
            report.strict_fail_reasons,
            vec![
                "incident_missing_in_compacted",
                "p95_within_threshold_violations_underreported_in_compacted",
                "p95_within_threshold_violations_missing_in_compacted",
            ]
        );
        assert_eq!(report.flags[FLAG].raw_violations, 1);
        assert_eq!(report.flags[FLAG].missing_in_compacted, 1);
        assert_eq!(
            report.flag_counters["p95_within_threshold_violations_missing_in_compacted"],
            1
        );
        assert_eq!(report.status, Status::Failed);
        assert!(report.incident_coverage_pct.abs() < f64::EPSILON);
    }

    #[test]
    fn latest_missing() {
        let raw = [rec(0, Status::Ok), rec(1, Status::Ok)];
        let compacted = [rec(0, Status::Ok)];
        let report = check_parity(
            &scan(&raw),
            &scan(&compacted),
            WindowSpec::Whole,
            &MonitorProfile::default(),
            now(),
        );
        assert!(!report.latest_present_ok);
        assert_eq!(report.strict_fail_reasons, vec!["latest_raw_missing_in_compacted"]);
        assert_eq!(report.raw_window_status, Status::Ok);
        assert_eq!(report.status, Status::Failed);
    }

    #[test]
    fn compacted_malformed_lines_are_informational() {
        let raw = [rec(0, Status::Ok)];
        let compacted = LedgerScan::parse(&format!("{{oops\n{}", ledger_text(&raw)));
        let report = check_parity(
            &scan(&raw),
            &compacted,
            WindowSpec::Whole,
            &MonitorProfile::default(),
            now(),
        );
        assert!(!report.malformed_parity_ok);
        assert!(report.strict_fail_reasons.is_empty());
        assert_eq!(report.status, Status::Ok);
    }

    #[test]
    fn empty_raw_is_trivially_in_parity() {
        let report = check_parity(
            &LedgerScan::default(),
            &LedgerScan::default(),
            WindowSpec::Last(5),
            &MonitorProfile::default(),
            now(),
        );
        assert!(report.latest_present_ok);
        assert!((report.incident_coverage_pct - 100.0).abs() < f64::EPSILON);
        assert!(report.strict_fail_reasons.is_empty());
        assert_eq!(report.raw_window_reasons, vec!["no_entries_in_window"]);
    }
}
