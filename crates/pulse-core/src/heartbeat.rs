//! Heartbeat records and the digest-to-record builder.
//!
//! # Identity
//!
//! `heartbeat_id` is a BLAKE3 digest over a domain separator and the
//! length-prefixed monitor name, normalized digest generation timestamp and
//! status. `run_at` is not an input, so re-processing an unchanged digest
//! always yields the same id and the appender can drop the retry.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::MonitorProfile;
use crate::error::PulseError;
use crate::flags::FlagState;
use crate::status::Status;

/// Domain separator for heartbeat identity hashing.
const HEARTBEAT_ID_DOMAIN: &[u8] = b"pulse.heartbeat_id.v1";

/// Hex characters kept from the identity digest.
const HEARTBEAT_ID_HEX_LEN: usize = 32;

/// Record keys the builder owns; digest fields with these names are not
/// copied into the payload.
const RESERVED_KEYS: [&str; 7] = [
    "run_at",
    "heartbeat_id",
    "status",
    "strict_fail_count",
    "strict_fail_reasons",
    "monitor",
    "source_generated_at",
];

/// One immutable health observation, stored as one ledger line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    /// When the observation was recorded.
    pub run_at: DateTime<Utc>,
    /// Deterministic identity used for deduplication.
    pub heartbeat_id: String,
    /// Observed status.
    pub status: Status,
    /// Number of entries in `strict_fail_reasons`.
    #[serde(default)]
    pub strict_fail_count: u64,
    /// Why strict evaluation of this single record would fail.
    #[serde(default)]
    pub strict_fail_reasons: Vec<String>,
    /// Monitor profile that built the record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
    /// Normalized generation timestamp of the source digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_generated_at: Option<DateTime<Utc>>,
    /// Domain payload, carried verbatim.
    #[serde(flatten)]
    pub payload: BTreeMap<String, Value>,
}

impl HeartbeatRecord {
    /// Read a payload flag.
    #[must_use]
    pub fn flag(&self, name: &str) -> FlagState {
        FlagState::of(self.payload.get(name))
    }
}

/// Compute the identity of a heartbeat.
#[must_use]
pub fn heartbeat_id(monitor: &str, generated_at: &DateTime<Utc>, status: Status) -> String {
    let normalized = normalize_timestamp(generated_at);
    let mut hasher = blake3::Hasher::new();
    hasher.update(HEARTBEAT_ID_DOMAIN);
    for field in [monitor, normalized.as_str(), status.as_str()] {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    let hex = hex::encode(hasher.finalize().as_bytes());
    format!("hb_{}", &hex[..HEARTBEAT_ID_HEX_LEN])
}

/// Canonical text form of a timestamp: UTC, RFC 3339, `Z` suffix.
#[must_use]
pub fn normalize_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Load a digest file and check that its root is a JSON object.
///
/// # Errors
///
/// [`PulseError::MissingInput`] if the file does not exist,
/// [`PulseError::InvalidJson`] if it does not parse, and
/// [`PulseError::InvalidShape`] if the root is not an object.
pub fn load_digest(path: &Path) -> Result<Map<String, Value>, PulseError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(PulseError::MissingInput {
                path: path.to_path_buf(),
            });
        },
        Err(err) => return Err(PulseError::io("read", path, err)),
    };
    let value: Value = serde_json::from_slice(&bytes).map_err(|source| PulseError::InvalidJson {
        path: path.to_path_buf(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(PulseError::InvalidShape {
            path: path.to_path_buf(),
            reason: format!("expected a JSON object, found {}", json_type_name(&other)),
        }),
    }
}

/// Maps external digests to heartbeat records for one monitor profile.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatBuilder<'a> {
    profile: &'a MonitorProfile,
}

impl<'a> HeartbeatBuilder<'a> {
    /// Creates a builder for `profile`.
    #[must_use]
    pub const fn new(profile: &'a MonitorProfile) -> Self {
        Self { profile }
    }

    /// Build a record from `digest`, stamped with `run_at`.
    ///
    /// # Errors
    ///
    /// Returns every validation problem found, as reason strings. No record
    /// is produced when any are present.
    pub fn build(
        &self,
        digest: &Map<String, Value>,
        run_at: DateTime<Utc>,
    ) -> Result<HeartbeatRecord, Vec<String>> {
        let mut errors = Vec::new();
        let ts_field = self.profile.generated_at_field.as_str();

        let status = match digest.get("status") {
            None => {
                errors.push("missing_field:status".to_string());
                None
            },
            Some(Value::String(raw)) => match raw.parse::<Status>() {
                Ok(status) => Some(status),
                Err(_) => {
                    errors.push(format!("invalid_value:status:{raw}"));
                    None
                },
            },
            Some(_) => {
                errors.push("invalid_type:status:expected_string".to_string());
                None
            },
        };

        let generated_at = match digest.get(ts_field) {
            None => {
                errors.push(format!("missing_field:{ts_field}"));
                None
            },
            Some(Value::String(raw)) => match DateTime::parse_from_rfc3339(raw) {
                Ok(ts) => Some(ts.with_timezone(&Utc)),
                Err(_) => {
                    errors.push(format!("invalid_timestamp:{ts_field}"));
                    None
                },
            },
            Some(_) => {
                errors.push(format!("invalid_type:{ts_field}:expected_string"));
                None
            },
        };

        for flag in &self.profile.flags {
            match digest.get(flag) {
                None | Some(Value::Null | Value::Bool(_)) => {},
                Some(_) => errors.push(format!("invalid_type:{flag}:expected_bool")),
            }
        }

        let (Some(status), Some(generated_at)) = (status, generated_at) else {
            return Err(errors);
        };
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut payload = BTreeMap::new();
        for (key, value) in digest {
            if key == ts_field || RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if value.is_object() || value.is_array() {
                debug!(field = %key, "skipping non-scalar digest field");
                continue;
            }
            payload.insert(key.clone(), value.clone());
        }

        let mut reasons: Vec<String> = Vec::new();
        if let Some(Value::Array(items)) = digest.get("strict_fail_reasons") {
            for item in items.iter().filter_map(Value::as_str) {
                push_unique(&mut reasons, item.to_string());
            }
        }
        if status.is_incident() {
            push_unique(&mut reasons, format!("status_{status}"));
        }
        for (key, value) in &payload {
            if (self.profile.flags.contains(key) || crate::flags::is_flag_name(key))
                && FlagState::of(Some(value)) == FlagState::Violated
            {
                push_unique(&mut reasons, format!("{key}_violated"));
            }
        }

        let monitor = self.profile.name.clone();
        let id = heartbeat_id(monitor.as_deref().unwrap_or(""), &generated_at, status);
        debug!(heartbeat_id = %id, %status, "built heartbeat");

        Ok(HeartbeatRecord {
            run_at,
            heartbeat_id: id,
            status,
            strict_fail_count: reasons.len() as u64,
            strict_fail_reasons: reasons,
            monitor,
            source_generated_at: Some(generated_at),
            payload,
        })
    }
}

fn push_unique(reasons: &mut Vec<String>, reason: String) {
    if !reasons.contains(&reason) {
        reasons.push(reason);
    }
}

const fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn digest(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test digests are objects"),
        }
    }

    fn run_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn builds_record_with_payload_and_reasons() {
        let profile = MonitorProfile::default();
        let digest = digest(json!({
            "status": "degraded",
            "generated_at": "2026-10-14T11:59:00Z",
            "p95_within_threshold": false,
            "click_rate": 0.42,
            "breakdown": {"a": 1},
        }));
        let record = HeartbeatBuilder::new(&profile).build(&digest, run_at()).unwrap();
        assert_eq!(record.status, Status::Degraded);
        assert_eq!(
            record.strict_fail_reasons,
            vec!["status_degraded", "p95_within_threshold_violated"]
        );
        assert_eq!(record.strict_fail_count, 2);
        assert_eq!(record.payload.get("click_rate"), Some(&json!(0.42)));
        assert!(!record.payload.contains_key("breakdown"));
        assert!(!record.payload.contains_key("generated_at"));
        assert!(record.heartbeat_id.starts_with("hb_"));
        assert_eq!(record.heartbeat_id.len(), 3 + HEARTBEAT_ID_HEX_LEN);
    }

    #[test]
    fn identity_ignores_run_at_and_normalizes_offsets() {
        let profile = MonitorProfile::default();
        let builder = HeartbeatBuilder::new(&profile);
        let a = builder
            .build(
                &digest(json!({"status": "ok", "generated_at": "2026-10-14T11:00:00Z"})),
                run_at(),
            )
            .unwrap();
        let b = builder
            .build(
                &digest(json!({"status": "ok", "generated_at": "2026-10-14T13:00:00+02:00"})),
                run_at() + chrono::Duration::hours(3),
            )
            .unwrap();
        assert_eq!(a.heartbeat_id, b.heartbeat_id);

        let c = builder
            .build(
                &digest(json!({"status": "failed", "generated_at": "2026-10-14T11:00:00Z"})),
                run_at(),
            )
            .unwrap();
        assert_ne!(a.heartbeat_id, c.heartbeat_id);
    }

    #[test]
    fn monitor_name_separates_identities() {
        let generated_at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_ne!(
            heartbeat_id("alpha", &generated_at, Status::Ok),
            heartbeat_id("beta", &generated_at, Status::Ok)
        );
    }

    #[test]
    fn collects_all_validation_errors() {
        let mut profile = MonitorProfile::default();
        profile.flags.insert("uptime_meets_minimum".to_string());
        let errors = HeartbeatBuilder::new(&profile)
            .build(
                &digest(json!({"status": 3, "uptime_meets_minimum": "yes"})),
                run_at(),
            )
            .unwrap_err();
        assert_eq!(
            errors,
            vec![
                "invalid_type:status:expected_string",
                "missing_field:generated_at",
                "invalid_type:uptime_meets_minimum:expected_bool",
            ]
        );
    }

    #[test]
    fn rejects_unknown_status_and_bad_timestamp() {
        let profile = MonitorProfile::default();
        let errors = HeartbeatBuilder::new(&profile)
            .build(
                &digest(json!({"status": "meh", "generated_at": "yesterday"})),
                run_at(),
            )
            .unwrap_err();
        assert_eq!(
            errors,
            vec!["invalid_value:status:meh", "invalid_timestamp:generated_at"]
        );
    }

    #[test]
    fn custom_timestamp_field() {
        let profile = MonitorProfile {
            generated_at_field: "generated_at_utc".to_string(),
            ..MonitorProfile::default()
        };
        let record = HeartbeatBuilder::new(&profile)
            .build(
                &digest(json!({"status": "ok", "generated_at_utc": "2026-10-14T00:00:00Z"})),
                run_at(),
            )
            .unwrap();
        assert!(record.strict_fail_reasons.is_empty());
        assert!(!record.payload.contains_key("generated_at_utc"));
    }

    #[test]
    fn carries_digest_reasons_first() {
        let profile = MonitorProfile::default();
        let record = HeartbeatBuilder::new(&profile)
            .build(
                &digest(json!({
                    "status": "failed",
                    "generated_at": "2026-10-14T00:00:00Z",
                    "strict_fail_reasons": ["upstream_timeout", "status_failed"],
                })),
                run_at(),
            )
            .unwrap();
        assert_eq!(
            record.strict_fail_reasons,
            vec!["upstream_timeout", "status_failed"]
        );
    }

    #[test]
    fn load_digest_checks_root_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("digest.json");

        assert!(matches!(
            load_digest(&path),
            Err(PulseError::MissingInput { .. })
        ));

        std::fs::write(&path, "[1, 2]").unwrap();
        let err = load_digest(&path).unwrap_err();
        assert!(matches!(err, PulseError::InvalidShape { .. }));
        assert!(err.to_string().contains("found array"));

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_digest(&path),
            Err(PulseError::InvalidJson { .. })
        ));

        std::fs::write(&path, r#"{"status": "ok"}"#).unwrap();
        assert_eq!(load_digest(&path).unwrap().len(), 1);
    }

    #[test]
    fn record_round_trips_through_json_line() {
        let profile = MonitorProfile::default();
        let record = HeartbeatBuilder::new(&profile)
            .build(
                &digest(json!({
                    "status": "ok",
                    "generated_at": "2026-10-14T00:00:00Z",
                    "parity_pct": 99.5,
                })),
                run_at(),
            )
            .unwrap();
        let line = serde_json::to_string(&record).unwrap();
        let parsed: HeartbeatRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed, record);
    }
}
