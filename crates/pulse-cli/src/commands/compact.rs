//! `pulse compact`: raw ledger to compacted ledger.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use pulse_core::{compact, read_ledger, replace_atomic, CompactionPolicy, PulseError};
use tracing::info;

use super::{display, output, Session};

/// Arguments for `pulse compact`. Policy flags override the profile.
#[derive(Args, Debug)]
pub struct CompactArgs {
    /// Raw ledger (read only)
    #[arg(long)]
    pub raw: PathBuf,

    /// Compacted ledger (replaced atomically)
    #[arg(long)]
    pub compacted: PathBuf,

    /// Newest records kept unconditionally
    #[arg(long)]
    pub keep_recent: Option<usize>,

    /// Records before the recent zone sampled at the mid stride
    #[arg(long)]
    pub keep_mid_span: Option<usize>,

    /// Mid-zone stride
    #[arg(long)]
    pub keep_mid_every: Option<usize>,

    /// Old-zone stride
    #[arg(long)]
    pub keep_old_every: Option<usize>,

    /// Raw size at which dropping nothing is a strict failure
    #[arg(long)]
    pub min_raw_for_dropped_check: Option<usize>,

    /// Force-keep records with a violated flag
    #[arg(long)]
    pub keep_flag_violations: Option<bool>,

    /// Compute the report without writing the compacted ledger
    #[arg(long)]
    pub dry_run: bool,
}

impl CompactArgs {
    fn policy(&self, base: &CompactionPolicy) -> CompactionPolicy {
        CompactionPolicy {
            keep_recent: self.keep_recent.unwrap_or(base.keep_recent),
            keep_mid_span: self.keep_mid_span.unwrap_or(base.keep_mid_span),
            keep_mid_every: self.keep_mid_every.unwrap_or(base.keep_mid_every),
            keep_old_every: self.keep_old_every.unwrap_or(base.keep_old_every),
            min_raw_for_dropped_check: self
                .min_raw_for_dropped_check
                .unwrap_or(base.min_raw_for_dropped_check),
            keep_flag_violations: self.keep_flag_violations.unwrap_or(base.keep_flag_violations),
        }
    }
}

/// Run `pulse compact`.
pub fn run_compact(args: &CompactArgs, session: &Session) -> u8 {
    let mut profile = session.profile.clone();
    profile.compaction = args.policy(&profile.compaction);
    if let Err(reason) = profile.compaction.validate() {
        return output::fail(&PulseError::InvalidPolicy(reason).into());
    }
    let scan = match read_ledger(&args.raw) {
        Ok(scan) => scan,
        Err(err) => return output::fail(&err.into()),
    };

    let mut result = compact(&scan, &profile, session.now);
    result.report.raw = Some(display(&args.raw));
    result.report.compacted = Some(display(&args.compacted));
    result.report.dry_run = args.dry_run;

    let failure = if args.dry_run {
        None
    } else {
        replace_atomic(&args.compacted, result.output.as_bytes())
            .with_context(|| format!("rewriting {}", args.compacted.display()))
            .err()
    };
    if failure.is_none() && !args.dry_run {
        info!(
            compacted = %args.compacted.display(),
            selected = result.report.selected_entries,
            "compacted ledger written"
        );
    }
    output::finish(session, &result.report, failure)
}
