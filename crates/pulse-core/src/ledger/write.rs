//! Ledger writes: single-record append and whole-file atomic replace.

use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::PulseError;
use crate::heartbeat::HeartbeatRecord;

/// Append `record` as one line, then fsync.
///
/// If the file ends in a torn line (no trailing newline), a newline is
/// written first so the torn line stays isolated as a single malformed line.
///
/// # Errors
///
/// Returns an error if the record cannot be serialized or the file cannot be
/// opened, written or synced.
pub fn append_record(path: &Path, record: &HeartbeatRecord) -> Result<(), PulseError> {
    let mut line = serde_json::to_string(record)?;
    line.push('\n');

    ensure_parent_dir(path)?;
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .map_err(|err| PulseError::io("open", path, err))?;

    let len = file
        .metadata()
        .map_err(|err| PulseError::io("stat", path, err))?
        .len();
    if len > 0 {
        let mut last = [0_u8; 1];
        file.seek(SeekFrom::Start(len - 1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|err| PulseError::io("read tail", path, err))?;
        if last[0] != b'\n' {
            line.insert(0, '\n');
        }
    }

    file.write_all(line.as_bytes())
        .map_err(|err| PulseError::io("append", path, err))?;
    file.sync_all()
        .map_err(|err| PulseError::io("sync", path, err))?;
    Ok(())
}

/// Replace `path` with `bytes` via a temp file in the same directory,
/// fsync, and rename. Readers see either the old file or the new one.
///
/// # Errors
///
/// Returns an I/O error if any step fails; the destination is untouched in
/// that case.
pub fn replace_atomic(path: &Path, bytes: &[u8]) -> Result<(), PulseError> {
    let dir = ensure_parent_dir(path)?;
    let mut temp =
        NamedTempFile::new_in(dir).map_err(|err| PulseError::io("create temp in", dir, err))?;
    temp.as_file_mut()
        .write_all(bytes)
        .map_err(|err| PulseError::io("write temp for", path, err))?;
    temp.as_file()
        .sync_all()
        .map_err(|err| PulseError::io("sync temp for", path, err))?;
    temp.persist(path)
        .map_err(|err| PulseError::io("persist", path, err.error))?;
    Ok(())
}

pub(super) fn ensure_parent_dir(path: &Path) -> Result<&Path, PulseError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|err| PulseError::io("create dir", parent, err))?;
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::ledger::read_ledger;
    use crate::status::Status;

    fn record(id: &str) -> HeartbeatRecord {
        HeartbeatRecord {
            run_at: Utc.with_ymd_and_hms(2026, 10, 14, 0, 0, 0).unwrap(),
            heartbeat_id: id.to_string(),
            status: Status::Ok,
            strict_fail_count: 0,
            strict_fail_reasons: Vec::new(),
            monitor: None,
            source_generated_at: None,
            payload: BTreeMap::new(),
        }
    }

    #[test]
    fn append_creates_file_and_parent_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested/dir/raw.jsonl");
        append_record(&path, &record("hb_1")).unwrap();
        append_record(&path, &record("hb_2")).unwrap();

        let scan = read_ledger(&path).unwrap();
        assert_eq!(scan.len(), 2);
        assert!(scan.malformed_lines.is_empty());
    }

    #[test]
    fn append_isolates_torn_tail() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("raw.jsonl");
        fs::write(&path, "{\"run_at\":\"2026-").unwrap();

        append_record(&path, &record("hb_1")).unwrap();

        let scan = read_ledger(&path).unwrap();
        assert_eq!(scan.len(), 1);
        assert_eq!(scan.malformed_lines, vec![1]);
        assert_eq!(scan.entries[0].line_no, 2);
        assert!(!scan.torn_tail);
    }

    #[test]
    fn replace_atomic_overwrites_and_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("compacted.jsonl");
        fs::write(&path, "old\n").unwrap();

        replace_atomic(&path, b"new\n").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new\n");
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("compacted.jsonl")]);
    }
}
