//! Reports reduced to digests one tier up.
//!
//! A rollup keeps `status`, `risk_level` and a timestamp, plus the strict
//! reasons and a handful of kind-specific scalars, and is shaped so the
//! heartbeat builder accepts it as a digest. The timestamp is the report's
//! `as_of` when it has one, so rolling up an unchanged ledger twice gives
//! the same heartbeat identity.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::PulseError;
use crate::report::{pick_scalars, HealthReport, ReportKind};
use crate::status::{RiskLevel, Status};

/// Digest derived from a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rollup {
    /// Report `as_of`, falling back to its `generated_at`.
    pub generated_at: DateTime<Utc>,
    /// Report status.
    pub status: Status,
    /// Risk summary of `status`.
    pub risk_level: RiskLevel,
    /// Kind of the source report.
    pub source_report: ReportKind,
    /// Number of strict reasons.
    pub strict_fail_count: usize,
    /// Strict reasons of the source report.
    pub strict_fail_reasons: Vec<String>,
    /// The source report passes strict mode.
    pub strict_checks_within_threshold: bool,
    /// Kind-specific scalars.
    #[serde(flatten)]
    pub scalars: Map<String, Value>,
}

impl Rollup {
    fn new(
        kind: ReportKind,
        status: Status,
        generated_at: DateTime<Utc>,
        reasons: Vec<String>,
        scalars: Map<String, Value>,
    ) -> Self {
        Self {
            generated_at,
            status,
            risk_level: status.risk_level(),
            source_report: kind,
            strict_fail_count: reasons.len(),
            strict_checks_within_threshold: reasons.is_empty(),
            strict_fail_reasons: reasons,
            scalars,
        }
    }

    /// Roll up an in-memory report.
    #[must_use]
    pub fn from_report(report: &impl HealthReport) -> Self {
        Self::new(
            report.kind(),
            report.status(),
            report.as_of().unwrap_or_else(|| report.generated_at()),
            report.strict_fail_reasons().to_vec(),
            report.rollup_scalars(),
        )
    }

    /// Roll up a report read back from JSON; `path` is used in errors.
    ///
    /// # Errors
    ///
    /// [`PulseError::InvalidShape`] if `report`, `status` or
    /// `generated_at` is missing or invalid.
    pub fn from_json(value: &Value, path: &Path) -> Result<Self, PulseError> {
        let shape = |reason: String| PulseError::InvalidShape {
            path: path.to_path_buf(),
            reason,
        };
        let object = value
            .as_object()
            .ok_or_else(|| shape("expected a report object".to_string()))?;

        let kind: ReportKind = field(object, "report")
            .ok_or_else(|| shape("missing or unknown `report` kind".to_string()))?;
        let status: Status = field(object, "status")
            .ok_or_else(|| shape("missing or invalid `status`".to_string()))?;
        let generated_at = field::<DateTime<Utc>>(object, "as_of")
            .or_else(|| field(object, "generated_at"))
            .ok_or_else(|| shape("missing or invalid `generated_at`".to_string()))?;
        let reasons: Vec<String> = match object.get("strict_fail_reasons") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            Some(_) => return Err(shape("`strict_fail_reasons` must be an array".to_string())),
        };

        Ok(Self::new(
            kind,
            status,
            generated_at,
            reasons,
            pick_scalars(value, kind.rollup_fields()),
        ))
    }

    /// The rollup as a digest object.
    ///
    /// # Errors
    ///
    /// Returns a serialization error; never expected for this type.
    pub fn to_digest(&self) -> Result<Map<String, Value>, PulseError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

fn field<T: serde::de::DeserializeOwned>(object: &Map<String, Value>, key: &str) -> Option<T> {
    object
        .get(key)
        .filter(|value| !value.is_null())
        .and_then(|value| serde_json::from_value(value.clone()).ok())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::config::MonitorProfile;
    use crate::heartbeat::HeartbeatBuilder;
    use crate::ledger::LedgerScan;
    use crate::testutil::{ledger_text, rec};
    use crate::window::{evaluate_window, WindowSpec};

    fn window_report(at_hour: u32) -> crate::window::WindowReport {
        let scan = LedgerScan::parse(&ledger_text(&[rec(0, Status::Ok), rec(1, Status::Failed)]));
        let now = Utc.with_ymd_and_hms(2026, 10, 14, at_hour, 0, 0).unwrap();
        evaluate_window(&scan, WindowSpec::Whole, &MonitorProfile::default(), now)
    }

    #[test]
    fn rollup_of_window_report() {
        let rollup = Rollup::from_report(&window_report(12));
        assert_eq!(rollup.status, Status::Failed);
        assert_eq!(rollup.risk_level, RiskLevel::Red);
        assert_eq!(rollup.source_report, ReportKind::Window);
        assert!(!rollup.strict_checks_within_threshold);
        assert_eq!(rollup.strict_fail_reasons, vec!["latest_status_failed"]);
        assert_eq!(rollup.scalars["entries_in_window"], json!(2));
        // as_of is the latest record's run_at, not the evaluation time
        assert_eq!(rollup.generated_at, rec(1, Status::Failed).run_at);
    }

    #[test]
    fn rerunning_on_unchanged_ledger_yields_same_heartbeat() {
        let profile = MonitorProfile::named("api.tier1");
        let builder = HeartbeatBuilder::new(&profile);
        let first = Rollup::from_report(&window_report(12)).to_digest().unwrap();
        let second = Rollup::from_report(&window_report(18)).to_digest().unwrap();
        assert_eq!(first, second);

        let now = Utc.with_ymd_and_hms(2026, 10, 14, 19, 0, 0).unwrap();
        let a = builder.build(&first, now).unwrap();
        let b = builder.build(&second, now).unwrap();
        assert_eq!(a.heartbeat_id, b.heartbeat_id);
        assert_eq!(a.status, Status::Failed);
        assert!(a
            .strict_fail_reasons
            .contains(&"strict_checks_within_threshold_violated".to_string()));
    }

    #[test]
    fn json_rollup_matches_in_memory_rollup() {
        let report = window_report(12);
        let value = serde_json::to_value(&report).unwrap();
        let from_json = Rollup::from_json(&value, Path::new("window.json")).unwrap();
        assert_eq!(from_json, Rollup::from_report(&report));
    }

    #[test]
    fn json_rollup_rejects_non_reports() {
        let path = Path::new("x.json");
        assert!(matches!(
            Rollup::from_json(&json!({"status": "ok"}), path),
            Err(PulseError::InvalidShape { .. })
        ));
        assert!(matches!(
            Rollup::from_json(&json!({"report": "window", "status": "meh"}), path),
            Err(PulseError::InvalidShape { .. })
        ));
        assert!(matches!(
            Rollup::from_json(&json!({"report": "window", "status": "ok"}), path),
            Err(PulseError::InvalidShape { .. })
        ));
    }

    #[test]
    fn falls_back_to_generated_at_without_as_of() {
        let value = json!({
            "report": "compaction",
            "status": "ok",
            "generated_at": "2026-10-14T00:00:00Z",
            "as_of": null,
            "entries_total": 0,
        });
        let rollup = Rollup::from_json(&value, Path::new("c.json")).unwrap();
        assert_eq!(
            rollup.generated_at,
            Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap()
        );
        assert!(rollup.strict_checks_within_threshold);
        assert_eq!(rollup.scalars["entries_total"], json!(0));
    }
}
