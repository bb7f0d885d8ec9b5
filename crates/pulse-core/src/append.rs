//! Idempotent heartbeat append.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::PulseError;
use crate::heartbeat::HeartbeatRecord;
use crate::ledger::{append_record, read_ledger_or_empty, LedgerLock};
use crate::status::Status;

/// Strict reason for a digest the builder refused.
pub const DIGEST_VALIDATION_FAILED: &str = "digest_validation_failed";

/// Outcome of one append attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppendReport {
    /// Ledger path.
    pub ledger: String,
    /// Identity of the candidate record, if one was built.
    pub heartbeat_id: Option<String>,
    /// Status of the candidate record, if one was built.
    pub status: Option<Status>,
    /// A line was written.
    pub appended: bool,
    /// A record with the same identity already existed.
    pub duplicate_detected: bool,
    /// Valid records before the attempt.
    pub history_size_before: usize,
    /// Valid records after the attempt.
    pub history_size_after: usize,
    /// Malformed lines in the ledger.
    pub malformed_lines: usize,
    /// Why the digest was rejected.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation_errors: Vec<String>,
    /// Number of strict reasons.
    pub strict_fail_count: usize,
    /// Strict-mode reasons.
    pub strict_fail_reasons: Vec<String>,
}

impl AppendReport {
    /// Report for a digest that failed validation. Nothing is written.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the ledger exists but cannot be read.
    pub fn rejected(ledger: &Path, validation_errors: Vec<String>) -> Result<Self, PulseError> {
        let history = read_ledger_or_empty(ledger)?;
        info!(ledger = %ledger.display(), errors = ?validation_errors, "digest rejected");
        Ok(Self {
            ledger: ledger.display().to_string(),
            heartbeat_id: None,
            status: None,
            appended: false,
            duplicate_detected: false,
            history_size_before: history.len(),
            history_size_after: history.len(),
            malformed_lines: history.malformed_lines.len(),
            validation_errors,
            strict_fail_count: 1,
            strict_fail_reasons: vec![DIGEST_VALIDATION_FAILED.to_string()],
        })
    }
}

/// Append `record` to `ledger` unless a record with the same identity is
/// already present.
///
/// The read-check-append sequence runs under the ledger's exclusive lock.
/// A missing ledger is created.
///
/// # Errors
///
/// Returns an I/O error if the lock, read or write fails.
pub fn append_heartbeat(
    ledger: &Path,
    record: &HeartbeatRecord,
) -> Result<AppendReport, PulseError> {
    let _lock = LedgerLock::acquire(ledger)?;
    let history = read_ledger_or_empty(ledger)?;
    let before = history.len();
    let duplicate = history.contains_id(&record.heartbeat_id);

    if duplicate {
        debug!(heartbeat_id = %record.heartbeat_id, "duplicate heartbeat, not appending");
    } else {
        append_record(ledger, record)?;
        info!(
            ledger = %ledger.display(),
            heartbeat_id = %record.heartbeat_id,
            status = %record.status,
            "heartbeat appended"
        );
    }

    Ok(AppendReport {
        ledger: ledger.display().to_string(),
        heartbeat_id: Some(record.heartbeat_id.clone()),
        status: Some(record.status),
        appended: !duplicate,
        duplicate_detected: duplicate,
        history_size_before: before,
        history_size_after: if duplicate { before } else { before + 1 },
        malformed_lines: history.malformed_lines.len(),
        validation_errors: Vec::new(),
        strict_fail_count: 0,
        strict_fail_reasons: Vec::new(),
    })
}
