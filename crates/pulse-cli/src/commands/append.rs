//! `pulse append`: build a heartbeat and append it once.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use pulse_core::{append_heartbeat, load_digest, AppendReport, HeartbeatBuilder};

use super::{output, Session};

/// Arguments for `pulse append`.
#[derive(Args, Debug)]
pub struct AppendArgs {
    /// Digest JSON file
    #[arg(long)]
    pub digest: PathBuf,

    /// Raw ledger (created if absent)
    #[arg(long)]
    pub ledger: PathBuf,
}

/// Run `pulse append`.
///
/// A rejected digest is reported with `appended=false`; it only fails the
/// run in strict mode.
pub fn run_append(args: &AppendArgs, session: &Session) -> u8 {
    let digest = match load_digest(&args.digest) {
        Ok(digest) => digest,
        Err(err) => return output::fail(&err.into()),
    };
    let result = match HeartbeatBuilder::new(&session.profile).build(&digest, session.now) {
        Ok(record) => append_heartbeat(&args.ledger, &record),
        Err(errors) => AppendReport::rejected(&args.ledger, errors),
    };
    match result.with_context(|| format!("appending to {}", args.ledger.display())) {
        Ok(report) => output::finish(session, &report, None),
        Err(err) => output::fail(&err),
    }
}
