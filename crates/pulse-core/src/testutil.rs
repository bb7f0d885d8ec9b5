//! Fixtures shared by unit tests.

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};
use serde_json::Value;

use crate::heartbeat::HeartbeatRecord;
use crate::status::Status;

/// Record `i` of a synthetic hourly series.
pub fn rec(i: usize, status: Status) -> HeartbeatRecord {
    let base = Utc.with_ymd_and_hms(2026, 10, 1, 0, 0, 0).unwrap();
    HeartbeatRecord {
        run_at: base + Duration::hours(i64::try_from(i).unwrap()),
        heartbeat_id: format!("hb_{i:04}"),
        status,
        strict_fail_count: 0,
        strict_fail_reasons: Vec::new(),
        monitor: None,
        source_generated_at: None,
        payload: BTreeMap::new(),
    }
}

/// Like [`rec`] with one flag set.
pub fn rec_with_flag(i: usize, status: Status, flag: &str, value: bool) -> HeartbeatRecord {
    let mut record = rec(i, status);
    record.payload.insert(flag.to_string(), Value::Bool(value));
    record
}

/// Serialize records as ledger text with a trailing newline.
pub fn ledger_text(records: &[HeartbeatRecord]) -> String {
    records
        .iter()
        .map(|record| serde_json::to_string(record).unwrap() + "\n")
        .collect()
}
