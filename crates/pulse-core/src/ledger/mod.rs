//! Newline-delimited JSON ledger codec.
//!
//! A ledger is read whole into a [`LedgerScan`]: the valid records in file
//! order, each with its line number and verbatim text, plus the line numbers
//! of malformed lines. Malformed lines never abort a scan.
//!
//! # Invariants
//!
//! - Blank lines are neither records nor malformed.
//! - Verbatim line text is kept so compaction can copy records byte-for-byte.
//! - A line that is not valid UTF-8 is malformed, whatever it contains.

mod lock;
mod write;

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

pub use self::lock::LedgerLock;
pub use self::write::{append_record, replace_atomic};
use crate::error::PulseError;
use crate::heartbeat::HeartbeatRecord;

/// Why a single ledger line was rejected.
#[derive(Debug, Error)]
pub enum LineError {
    /// The line is not valid UTF-8.
    #[error("not valid UTF-8: {0}")]
    NotUtf8(std::str::Utf8Error),
    /// The line is not JSON at all (often a torn write).
    #[error("not valid JSON: {0}")]
    NotJson(serde_json::Error),
    /// The line is JSON but not an object.
    #[error("JSON root is not an object")]
    NotObject,
    /// The object is not a heartbeat record.
    #[error("not a heartbeat record: {0}")]
    NotRecord(serde_json::Error),
}

/// Parse one ledger line into a record.
///
/// # Errors
///
/// Returns a [`LineError`] describing why the line is malformed.
pub fn parse_line(line: &str) -> Result<HeartbeatRecord, LineError> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(LineError::NotJson)?;
    if !value.is_object() {
        return Err(LineError::NotObject);
    }
    serde_json::from_value(value).map_err(LineError::NotRecord)
}

/// A valid record and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// 1-based line number in the source file.
    pub line_no: usize,
    /// The line exactly as read, without its terminator.
    pub line: String,
    /// The parsed record.
    pub record: HeartbeatRecord,
}

/// The parsed contents of a ledger file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerScan {
    /// Valid records in file (chronological) order.
    pub entries: Vec<LedgerEntry>,
    /// 1-based line numbers of malformed lines.
    pub malformed_lines: Vec<usize>,
    /// Whether the file ended without a trailing newline.
    pub torn_tail: bool,
}

impl LedgerScan {
    /// Parse ledger text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        Self::parse_bytes(text.as_bytes())
    }

    /// Parse raw ledger bytes, line by line.
    #[must_use]
    pub fn parse_bytes(bytes: &[u8]) -> Self {
        let mut scan = Self {
            torn_tail: bytes.last().is_some_and(|&last| last != b'\n'),
            ..Self::default()
        };
        for (idx, raw) in bytes.split(|&byte| byte == b'\n').enumerate() {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line_no = idx + 1;
            let line = match std::str::from_utf8(raw) {
                Ok(line) => line,
                Err(err) => {
                    debug!(line_no, error = %LineError::NotUtf8(err), "malformed ledger line");
                    scan.malformed_lines.push(line_no);
                    continue;
                },
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok(record) => scan.entries.push(LedgerEntry {
                    line_no,
                    line: line.to_string(),
                    record,
                }),
                Err(err) => {
                    debug!(line_no, error = %err, "malformed ledger line");
                    scan.malformed_lines.push(line_no);
                },
            }
        }
        scan
    }

    /// Number of valid records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no valid records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recent valid record.
    #[must_use]
    pub fn latest(&self) -> Option<&HeartbeatRecord> {
        self.entries.last().map(|entry| &entry.record)
    }

    /// Iterate over valid records in order.
    pub fn records(&self) -> impl Iterator<Item = &HeartbeatRecord> {
        self.entries.iter().map(|entry| &entry.record)
    }

    /// Identities of every valid record.
    #[must_use]
    pub fn ids(&self) -> HashSet<&str> {
        self.records()
            .map(|record| record.heartbeat_id.as_str())
            .collect()
    }

    /// Whether any valid record carries `heartbeat_id`.
    #[must_use]
    pub fn contains_id(&self, heartbeat_id: &str) -> bool {
        self.records()
            .any(|record| record.heartbeat_id == heartbeat_id)
    }

    /// Malformed lines at or after `line_no`.
    #[must_use]
    pub fn malformed_from(&self, line_no: usize) -> usize {
        self.malformed_lines
            .iter()
            .filter(|&&malformed| malformed >= line_no)
            .count()
    }
}

/// Read a ledger that must exist.
///
/// # Errors
///
/// [`PulseError::MissingInput`] if the file does not exist, otherwise an
/// I/O error.
pub fn read_ledger(path: &Path) -> Result<LedgerScan, PulseError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(LedgerScan::parse_bytes(&bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(PulseError::MissingInput {
            path: path.to_path_buf(),
        }),
        Err(err) => Err(PulseError::io("read", path, err)),
    }
}

/// Read a ledger, treating a missing file as empty.
///
/// # Errors
///
/// Returns an I/O error for anything other than "not found".
pub fn read_ledger_or_empty(path: &Path) -> Result<LedgerScan, PulseError> {
    match read_ledger(path) {
        Err(PulseError::MissingInput { .. }) => Ok(LedgerScan::default()),
        other => other,
    }
}
