//! Fuzz harness for `LedgerScan::parse_bytes`.
//!
//! Arbitrary bytes are scanned as the ledger reader does. Every line that is
//! not blank UTF-8 must land in exactly one of the two buckets, and the
//! window selection must stay within the scan.

#![no_main]
use chrono::Utc;
use libfuzzer_sys::fuzz_target;
use pulse_core::{evaluate_window, LedgerScan, MonitorProfile, WindowSpec};

fuzz_target!(|data: &[u8]| {
    let scan = LedgerScan::parse_bytes(data);

    let non_blank = data
        .split(|&byte| byte == b'\n')
        .filter(|raw| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            std::str::from_utf8(raw).map_or(true, |line| !line.trim().is_empty())
        })
        .count();
    assert_eq!(scan.len() + scan.malformed_lines.len(), non_blank);

    let profile = MonitorProfile::default();
    let report = evaluate_window(&scan, WindowSpec::Last(3), &profile, Utc::now());
    assert!(report.entries_in_window <= scan.len().min(3));
    assert!(report.malformed_entries_in_window <= report.malformed_entries_total);
});
