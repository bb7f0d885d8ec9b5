//! Boolean violation flags carried in heartbeat payloads.
//!
//! A flag is any payload field named in the monitor profile, or any field
//! whose name ends with one of [`FLAG_SUFFIXES`]. Its value is read as:
//!
//! - `true`: satisfied
//! - `false`: violated
//! - absent, `null`, or a non-boolean: missing telemetry
//!
//! Missing and violated are counted separately.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Value;

use crate::heartbeat::HeartbeatRecord;

/// Naming conventions that mark a payload field as a threshold flag.
pub const FLAG_SUFFIXES: [&str; 2] = ["_within_threshold", "_meets_minimum"];

/// Reading of one flag on one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagState {
    /// Explicit `true`.
    Satisfied,
    /// Explicit `false`.
    Violated,
    /// Absent, `null`, or not a boolean.
    Missing,
}

impl FlagState {
    /// Classify a raw payload value.
    #[must_use]
    pub const fn of(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(true)) => Self::Satisfied,
            Some(Value::Bool(false)) => Self::Violated,
            _ => Self::Missing,
        }
    }
}

/// Whether a field name follows the flag naming convention.
#[must_use]
pub fn is_flag_name(name: &str) -> bool {
    FLAG_SUFFIXES
        .iter()
        .any(|suffix| name.len() > suffix.len() && name.ends_with(suffix))
}

/// Per-flag tallies over a set of records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagCounts {
    /// Records where the flag is `false`.
    pub violated: u64,
    /// Records where the flag is `true`.
    pub satisfied: u64,
    /// Records where the flag is absent, `null`, or not a boolean.
    pub missing: u64,
}

impl FlagCounts {
    pub(crate) fn observe(&mut self, state: FlagState) {
        match state {
            FlagState::Satisfied => self.satisfied += 1,
            FlagState::Violated => self.violated += 1,
            FlagState::Missing => self.missing += 1,
        }
    }
}

/// Flags to track: the configured names plus every conventionally named
/// field found on `records`.
#[must_use]
pub fn tracked_flags<'a>(
    configured: &BTreeSet<String>,
    records: impl IntoIterator<Item = &'a HeartbeatRecord>,
) -> BTreeSet<String> {
    let mut flags = configured.clone();
    for record in records {
        for key in record.payload.keys() {
            if is_flag_name(key) && !flags.contains(key) {
                flags.insert(key.clone());
            }
        }
    }
    flags
}

/// Whether any tracked flag on `record` is explicitly violated.
#[must_use]
pub fn has_violation(record: &HeartbeatRecord, flags: &BTreeSet<String>) -> bool {
    flags
        .iter()
        .any(|flag| record.flag(flag) == FlagState::Violated)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn classify_values() {
        assert_eq!(FlagState::of(Some(&json!(true))), FlagState::Satisfied);
        assert_eq!(FlagState::of(Some(&json!(false))), FlagState::Violated);
        assert_eq!(FlagState::of(Some(&Value::Null)), FlagState::Missing);
        assert_eq!(FlagState::of(Some(&json!("false"))), FlagState::Missing);
        assert_eq!(FlagState::of(None), FlagState::Missing);
    }

    #[test]
    fn naming_convention() {
        assert!(is_flag_name("p95_latency_within_threshold"));
        assert!(is_flag_name("coverage_meets_minimum"));
        assert!(!is_flag_name("_within_threshold"));
        assert!(!is_flag_name("within_threshold_count"));
        assert!(!is_flag_name("status"));
    }

    #[test]
    fn counts_keep_missing_apart_from_violated() {
        let mut counts = FlagCounts::default();
        for state in [
            FlagState::Violated,
            FlagState::Missing,
            FlagState::Satisfied,
            FlagState::Missing,
        ] {
            counts.observe(state);
        }
        assert_eq!(
            counts,
            FlagCounts {
                violated: 1,
                satisfied: 1,
                missing: 2
            }
        );
    }
}
