//! Tiered retention of a raw ledger into a compacted ledger.
//!
//! Zones are measured back from the tail of the valid records: the newest
//! `keep_recent` records are kept whole, the `keep_mid_span` before them are
//! sampled every `keep_mid_every` records, and everything older every
//! `keep_old_every`. Sampling is anchored on the absolute record index, so a
//! record selected in the old zone stays selected as the ledger grows.
//!
//! On top of sampling, incidents (`status != ok`), flag violations (when
//! `keep_flag_violations`) and the latest record are always kept. Selected
//! lines are copied byte-for-byte.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::MonitorProfile;
use crate::flags::{has_violation, tracked_flags, FlagState};
use crate::ledger::{LedgerEntry, LedgerScan};
use crate::report::{pick_scalars, HealthReport, ReportKind};
use crate::status::{RiskLevel, Status};

/// Retention policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CompactionPolicy {
    /// Newest records kept unconditionally.
    pub keep_recent: usize,
    /// Records before the recent zone that are sampled at the mid stride.
    pub keep_mid_span: usize,
    /// Mid-zone stride.
    pub keep_mid_every: usize,
    /// Old-zone stride.
    pub keep_old_every: usize,
    /// Raw size at which dropping nothing becomes a strict failure.
    pub min_raw_for_dropped_check: usize,
    /// Force-keep records with a violated flag.
    pub keep_flag_violations: bool,
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            keep_recent: 24,
            keep_mid_span: 168,
            keep_mid_every: 6,
            keep_old_every: 24,
            min_raw_for_dropped_check: 50,
            keep_flag_violations: true,
        }
    }
}

impl CompactionPolicy {
    /// Strides must be positive.
    ///
    /// # Errors
    ///
    /// Returns a description naming the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.keep_mid_every == 0 {
            return Err("keep_mid_every must be >= 1".to_string());
        }
        if self.keep_old_every == 0 {
            return Err("keep_old_every must be >= 1".to_string());
        }
        Ok(())
    }
}

/// Retention zone of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Zone {
    /// Kept whole.
    Recent,
    /// Sampled at `keep_mid_every`.
    Mid,
    /// Sampled at `keep_old_every`.
    Old,
}

/// Record count per zone.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ZoneSizes {
    /// Records in the recent zone.
    pub recent: usize,
    /// Records in the mid zone.
    pub mid: usize,
    /// Records in the old zone.
    pub old: usize,
}

/// Which records survive compaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPlan {
    /// One entry per valid raw record, in order.
    pub keep: Vec<bool>,
    /// Zone sizes.
    pub zones: ZoneSizes,
}

impl RetentionPlan {
    /// Plan retention for `entries` under `policy`. `flags` are the flags
    /// whose violations are force-kept.
    #[must_use]
    pub fn new(
        entries: &[LedgerEntry],
        policy: &CompactionPolicy,
        flags: &BTreeSet<String>,
    ) -> Self {
        let n = entries.len();
        let recent_start = n.saturating_sub(policy.keep_recent);
        let mid_start = recent_start.saturating_sub(policy.keep_mid_span);
        let zone_of = |idx: usize| {
            if idx >= recent_start {
                Zone::Recent
            } else if idx >= mid_start {
                Zone::Mid
            } else {
                Zone::Old
            }
        };

        let keep = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let sampled = match zone_of(idx) {
                    Zone::Recent => true,
                    Zone::Mid => idx % policy.keep_mid_every.max(1) == 0,
                    Zone::Old => idx % policy.keep_old_every.max(1) == 0,
                };
                sampled
                    || idx + 1 == n
                    || entry.record.status.is_incident()
                    || (policy.keep_flag_violations && has_violation(&entry.record, flags))
            })
            .collect();

        Self {
            keep,
            zones: ZoneSizes {
                recent: n - recent_start,
                mid: recent_start - mid_start,
                old: mid_start,
            },
        }
    }

    /// Number of records kept.
    #[must_use]
    pub fn selected(&self) -> usize {
        self.keep.iter().filter(|&&kept| kept).count()
    }
}

/// Whether the latest record made it into the compacted ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompactionAnchors {
    /// The latest raw record is selected.
    pub latest_selected: bool,
    /// Its identity.
    pub latest_heartbeat_id: Option<String>,
}

/// Outcome of a compaction run.
#[derive(Debug, Clone, Serialize)]
pub struct CompactionReport {
    /// Always [`ReportKind::Compaction`].
    pub report: ReportKind,
    /// Evaluation time.
    pub generated_at: DateTime<Utc>,
    /// `run_at` of the latest raw record.
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
    /// The report was computed without writing.
    pub dry_run: bool,
    /// The policy that was applied.
    pub policy: CompactionPolicy,
    /// Valid raw records.
    pub entries_total: usize,
    /// Records written to the compacted ledger.
    pub selected_entries: usize,
    /// Records left out.
    pub dropped_entries: usize,
    /// Malformed raw lines, never written.
    pub malformed_lines_skipped: usize,
    /// Raw records with `status != ok`.
    pub incidents_total: usize,
    /// Incidents left out.
    pub incidents_dropped: usize,
    /// Raw `failed` records.
    pub failed_total: usize,
    /// `failed` records left out.
    pub failed_dropped: usize,
    /// Raw `degraded` records.
    pub degraded_total: usize,
    /// `degraded` records left out.
    pub degraded_dropped: usize,
    /// `<flag>_violations_total` and `<flag>_violations_dropped`.
    #[serde(flatten)]
    pub flag_counters: BTreeMap<String, usize>,
    /// Latest-record anchor.
    pub anchors: CompactionAnchors,
    /// Zone sizes.
    pub zones: ZoneSizes,
    /// Aggregate status.
    pub status: Status,
    /// Risk summary of `status`.
    pub risk_level: RiskLevel,
    /// Number of strict reasons.
    pub strict_fail_count: usize,
    /// Strict-mode reasons.
    pub strict_fail_reasons: Vec<String>,
}

/// Compaction result: the report and the compacted ledger text.
#[derive(Debug, Clone)]
pub struct Compaction {
    /// What happened.
    pub report: CompactionReport,
    /// Selected lines, newline-terminated, in raw order.
    pub output: String,
}

#[derive(Default)]
struct Tally {
    total: usize,
    dropped: usize,
}

impl Tally {
    fn observe(&mut self, kept: bool) {
        self.total += 1;
        if !kept {
            self.dropped += 1;
        }
    }
}

/// Compact `scan` under `profile.compaction`.
#[must_use]
pub fn compact(scan: &LedgerScan, profile: &MonitorProfile, now: DateTime<Utc>) -> Compaction {
    let policy = &profile.compaction;
    let flags = tracked_flags(&profile.flags, scan.records());
    let plan = RetentionPlan::new(&scan.entries, policy, &flags);

    let mut output = String::new();
    let mut incidents = Tally::default();
    let mut failed = Tally::default();
    let mut degraded = Tally::default();
    let mut flag_tallies: BTreeMap<&str, Tally> = flags
        .iter()
        .map(|flag| (flag.as_str(), Tally::default()))
        .collect();

    for (entry, &kept) in scan.entries.iter().zip(&plan.keep) {
        if kept {
            output.push_str(&entry.line);
            output.push('\n');
        }
        match entry.record.status {
            Status::Ok => {},
            Status::Degraded => {
                incidents.observe(kept);
                degraded.observe(kept);
            },
            Status::Failed => {
                incidents.observe(kept);
                failed.observe(kept);
            },
        }
        for (flag, tally) in &mut flag_tallies {
            if entry.record.flag(flag) == FlagState::Violated {
                tally.observe(kept);
            }
        }
    }

    let selected_entries = plan.selected();
    let dropped_entries = scan.len() - selected_entries;
    let anchors = CompactionAnchors {
        latest_selected: plan.keep.last().copied().unwrap_or(true),
        latest_heartbeat_id: scan.latest().map(|record| record.heartbeat_id.clone()),
    };

    let mut breaches = Vec::new();
    let categories = [
        ("incidents", &incidents),
        ("failed", &failed),
        ("degraded", &degraded),
    ];
    for (category, tally) in categories {
        if tally.dropped > 0 {
            breaches.push(format!("{category}_dropped"));
        }
    }
    if policy.keep_flag_violations {
        for (flag, tally) in &flag_tallies {
            if tally.dropped > 0 {
                breaches.push(format!("{flag}_violations_dropped"));
            }
        }
    }
    if !anchors.latest_selected {
        breaches.push("latest_not_selected".to_string());
    }

    let mut reasons = Vec::new();
    let no_drop = scan.len() >= policy.min_raw_for_dropped_check && dropped_entries == 0;
    if no_drop {
        reasons.push("no_entries_dropped_above_threshold".to_string());
    }
    let status = if !breaches.is_empty() {
        Status::Failed
    } else if no_drop {
        Status::Degraded
    } else {
        Status::Ok
    };
    reasons.extend(breaches);

    let mut flag_counters = BTreeMap::new();
    for (flag, tally) in &flag_tallies {
        flag_counters.insert(format!("{flag}_violations_total"), tally.total);
        flag_counters.insert(format!("{flag}_violations_dropped"), tally.dropped);
    }

    debug!(
        entries_total = scan.len(),
        selected_entries, dropped_entries, "compaction planned"
    );
    if status != Status::Ok {
        info!(%status, reasons = ?reasons, "compaction flagged");
    }

    let report = CompactionReport {
        report: ReportKind::Compaction,
        generated_at: now,
        as_of: scan.latest().map(|record| record.run_at),
        monitor: profile.name.clone(),
        raw: None,
        compacted: None,
        dry_run: false,
        policy: policy.clone(),
        entries_total: scan.len(),
        selected_entries,
        dropped_entries,
        malformed_lines_skipped: scan.malformed_lines.len(),
        incidents_total: incidents.total,
        incidents_dropped: incidents.dropped,
        failed_total: failed.total,
        failed_dropped: failed.dropped,
        degraded_total: degraded.total,
        degraded_dropped: degraded.dropped,
        flag_counters,
        anchors,
        zones: plan.zones,
        status,
        risk_level: status.risk_level(),
        strict_fail_count: reasons.len(),
        strict_fail_reasons: reasons,
    };
    Compaction { report, output }
}

impl HealthReport for CompactionReport {
    fn kind(&self) -> ReportKind {
        ReportKind::Compaction
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
            .map(|value| pick_scalars(&value, ReportKind::Compaction.rollup_fields()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::testutil::{ledger_text, rec, rec_with_flag};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    fn profile(policy: CompactionPolicy) -> MonitorProfile {
        MonitorProfile {
            compaction: policy,
            ..MonitorProfile::default()
        }
    }

    fn small_policy() -> CompactionPolicy {
        CompactionPolicy {
            keep_recent: 2,
            keep_mid_span: 4,
            keep_mid_every: 2,
            keep_old_every: 5,
            min_raw_for_dropped_check: 5,
            keep_flag_violations: true,
        }
    }

    #[test]
    fn sixteen_record_scenario() {
        let records: Vec<_> = (0..16)
            .map(|i| match i {
                3 => rec(i, Status::Failed),
                9 => rec(i, Status::Degraded),
                _ => rec(i, Status::Ok),
            })
            .collect();
        let scan = LedgerScan::parse(&ledger_text(&records));
        let result = compact(&scan, &profile(small_policy()), now());
        let report = &result.report;

        assert_eq!(report.entries_total, 16);
        assert_eq!(report.incidents_total, 2);
        assert_eq!(report.incidents_dropped, 0);
        assert_eq!(report.failed_dropped, 0);
        assert_eq!(report.degraded_dropped, 0);
        assert!(report.dropped_entries > 0);
        assert!(report.anchors.latest_selected);
        assert!(report.strict_fail_reasons.is_empty());
        assert_eq!(report.status, Status::Ok);
        assert_eq!(
            report.zones,
            ZoneSizes {
                recent: 2,
                mid: 4,
                old: 10
            }
        );

        // old: 0, 5; incidents: 3, 9; mid (10..14) even: 10, 12; recent: 14, 15
        let kept: Vec<_> = LedgerScan::parse(&result.output)
            .records()
            .map(|record| record.heartbeat_id.clone())
            .collect();
        let expected: Vec<_> = [0, 3, 5, 9, 10, 12, 14, 15]
            .iter()
            .map(|i| format!("hb_{i:04}"))
            .collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn no_drop_guard() {
        let records: Vec<_> = (0..30).map(|i| rec(i, Status::Ok)).collect();
        let scan = LedgerScan::parse(&ledger_text(&records));
        let policy = CompactionPolicy {
            keep_recent: 100,
            min_raw_for_dropped_check: 20,
            ..CompactionPolicy::default()
        };
        let report = compact(&scan, &profile(policy), now()).report;
        assert_eq!(report.dropped_entries, 0);
        assert_eq!(report.status, Status::Degraded);
        assert_eq!(
            report.strict_fail_reasons,
            vec!["no_entries_dropped_above_threshold"]
        );
    }

    #[test]
    fn small_ledger_below_guard_threshold_passes() {
        let records: Vec<_> = (0..3).map(|i| rec(i, Status::Ok)).collect();
        let scan = LedgerScan::parse(&ledger_text(&records));
        let report = compact(&scan, &MonitorProfile::default(), now()).report;
        assert_eq!(report.dropped_entries, 0);
        assert!(report.strict_fail_reasons.is_empty());
    }

    #[test]
    fn flag_violations_are_force_kept_and_counted() {
        let mut records: Vec<_> = (0..20).map(|i| rec(i, Status::Ok)).collect();
        records[1] = rec_with_flag(1, Status::Ok, "p95_within_threshold", false);
        records[2] = rec_with_flag(2, Status::Ok, "p95_within_threshold", true);
        let scan = LedgerScan::parse(&ledger_text(&records));

        let report = compact(&scan, &profile(small_policy()), now()).report;
        assert_eq!(report.flag_counters["p95_within_threshold_violations_total"], 1);
        assert_eq!(report.flag_counters["p95_within_threshold_violations_dropped"], 0);

        let mut lax = small_policy();
        lax.keep_flag_violations = false;
        let report = compact(&scan, &profile(lax), now()).report;
        assert_eq!(report.flag_counters["p95_within_threshold_violations_dropped"], 1);
        assert!(report.strict_fail_reasons.is_empty());
    }

    #[test]
    fn old_zone_selection_is_stable_as_ledger_grows() {
        let policy = small_policy();
        let flags = BTreeSet::new();
        let kept_old = |n: usize| {
            let records: Vec<_> = (0..n).map(|i| rec(i, Status::Ok)).collect();
            let scan = LedgerScan::parse(&ledger_text(&records));
            let plan = RetentionPlan::new(&scan.entries, &policy, &flags);
            (0..10).filter(|&i| plan.keep[i]).collect::<Vec<_>>()
        };
        assert_eq!(kept_old(20), kept_old(25));
    }

    #[test]
    fn malformed_lines_are_skipped_and_verbatim_lines_copied() {
        let records = [rec(0, Status::Ok), rec(1, Status::Ok)];
        let text = format!("not json\n{}", ledger_text(&records));
        let scan = LedgerScan::parse(&text);
        let result = compact(&scan, &MonitorProfile::default(), now());
        assert_eq!(result.report.malformed_lines_skipped, 1);
        assert_eq!(result.output, ledger_text(&records));
    }

    #[test]
    fn empty_ledger() {
        let result = compact(&LedgerScan::default(), &MonitorProfile::default(), now());
        assert_eq!(result.output, "");
        assert!(result.report.anchors.latest_selected);
        assert!(result.report.anchors.latest_heartbeat_id.is_none());
        assert_eq!(result.report.status, Status::Ok);
    }

    #[test]
    fn report_flattens_flag_counters() {
        let records = [rec_with_flag(0, Status::Ok, "rows_meets_minimum", false)];
        let scan = LedgerScan::parse(&ledger_text(&records));
        let value = serde_json::to_value(compact(&scan, &MonitorProfile::default(), now()).report)
            .unwrap();
        assert_eq!(value["report"], "compaction");
        assert_eq!(value["rows_meets_minimum_violations_total"], 1);
        assert_eq!(value["anchors"]["latest_selected"], true);
    }

    #[test]
    fn policy_validation() {
        assert!(CompactionPolicy::default().validate().is_ok());
        let policy = CompactionPolicy {
            keep_mid_every: 0,
            ..CompactionPolicy::default()
        };
        assert!(policy.validate().unwrap_err().contains("keep_mid_every"));
    }
}
