//! `pulse rollup`: report file to next-tier digest.

use std::path::PathBuf;

use clap::Args;
use pulse_core::{load_digest, Rollup};
use serde_json::Value;

use super::{output, Session};

/// Arguments for `pulse rollup`.
#[derive(Args, Debug)]
pub struct RollupArgs {
    /// Window, parity, compaction or chain report JSON
    #[arg(long)]
    pub report: PathBuf,
}

/// Run `pulse rollup`. The printed digest can be fed to `pulse append`.
pub fn run_rollup(args: &RollupArgs, session: &Session) -> u8 {
    let digest = load_digest(&args.report)
        .and_then(|object| Rollup::from_json(&Value::Object(object), &args.report))
        .and_then(|rollup| rollup.to_digest());
    match digest {
        Ok(digest) => output::finish_digest(session, &Value::Object(digest)),
        Err(err) => output::fail(&err.into()),
    }
}
