//! Common surface of the derived reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::status::Status;

/// Which stage produced a report. Serialized as the `report` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    /// [`crate::window::WindowReport`].
    Window,
    /// [`crate::parity::ParityReport`].
    Parity,
    /// [`crate::compaction::CompactionReport`].
    Compaction,
    /// [`crate::pipeline::ChainReport`].
    Chain,
}

impl ReportKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Parity => "parity",
            Self::Compaction => "compaction",
            Self::Chain => "chain",
        }
    }

    /// Scalar fields carried into a rollup digest, per kind.
    #[must_use]
    pub const fn rollup_fields(self) -> &'static [&'static str] {
        match self {
            Self::Window => &[
                "entries_in_window",
                "malformed_entries_in_window",
                "failed_pct",
                "degraded_pct",
            ],
            Self::Parity => &[
                "entries_in_window",
                "coverage_pct",
                "incident_coverage_pct",
                "latest_present_ok",
                "incident_parity_ok",
                "flag_parity_ok",
            ],
            Self::Compaction => &["entries_total", "selected_entries", "dropped_entries"],
            Self::Chain => &["tiers"],
        }
    }
}

/// Anything that can be reduced to a digest one tier up.
pub trait HealthReport {
    /// Producing stage.
    fn kind(&self) -> ReportKind;

    /// Aggregate status.
    fn status(&self) -> Status;

    /// Wall-clock time of evaluation.
    fn generated_at(&self) -> DateTime<Utc>;

    /// Run time of the newest record the report looked at, if any.
    fn as_of(&self) -> Option<DateTime<Utc>>;

    /// Strict-mode reasons; empty means strict pass.
    fn strict_fail_reasons(&self) -> &[String];

    /// Kind-specific scalars for the rollup digest.
    fn rollup_scalars(&self) -> Map<String, Value>;
}

/// Pick `fields` out of a serialized report, keeping scalars only.
pub(crate) fn pick_scalars(value: &Value, fields: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(v) = value.get(*field) {
            if !v.is_object() && !v.is_array() {
                out.insert((*field).to_string(), v.clone());
            }
        }
    }
    out
}

/// `count * 100 / total`, or 100 for an empty set.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn coverage_pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        100.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}

/// `count * 100 / total`, or 0 for an empty set.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn share_pct(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 * 100.0 / total as f64
    }
}
