//! Advisory per-ledger write lock.
//!
//! The read-check-append sequence of the appender runs under an exclusive
//! `flock` on a sibling `<ledger>.lock` file, so concurrent retries of the
//! same digest cannot both observe "absent" and both append. The ledger's
//! directory is created if needed, since the lock file lives beside it.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::debug;

use super::write::ensure_parent_dir;
use crate::error::PulseError;

/// Exclusive lock held for the lifetime of the value.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Path of the lock file guarding `ledger`.
    #[must_use]
    pub fn lock_path(ledger: &Path) -> PathBuf {
        let mut name = OsString::from(ledger.as_os_str());
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Block until the lock for `ledger` is held.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the ledger directory cannot be created or the
    /// lock file cannot be opened or locked.
    pub fn acquire(ledger: &Path) -> Result<Self, PulseError> {
        let path = Self::lock_path(ledger);
        ensure_parent_dir(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| PulseError::io("open lock", &path, err))?;
        FileExt::lock_exclusive(&file).map_err(|err| PulseError::io("lock", &path, err))?;
        debug!(lock = %path.display(), "ledger lock acquired");
        Ok(Self { file, path })
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        // Closing the descriptor also releases the lock.
        let _ = FileExt::unlock(&self.file);
        debug!(lock = %self.path.display(), "ledger lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_path_appends_suffix() {
        assert_eq!(
            LedgerLock::lock_path(Path::new("/var/pulse/raw.jsonl")),
            PathBuf::from("/var/pulse/raw.jsonl.lock")
        );
    }

    #[test]
    fn lock_is_exclusive_until_dropped() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = tmp.path().join("raw.jsonl");
        let guard = LedgerLock::acquire(&ledger).unwrap();

        let held = File::open(LedgerLock::lock_path(&ledger)).unwrap();
        assert!(FileExt::try_lock_exclusive(&held).is_err());

        drop(guard);
        let after_release = File::open(LedgerLock::lock_path(&ledger)).unwrap();
        FileExt::try_lock_exclusive(&after_release).expect("lock free after drop");
    }

    #[test]
    fn acquire_creates_missing_ledger_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let ledger = tmp.path().join("ledgers/api/raw.jsonl");
        let _guard = LedgerLock::acquire(&ledger).unwrap();
        assert!(LedgerLock::lock_path(&ledger).is_file());
        assert!(!ledger.exists());
    }
}
