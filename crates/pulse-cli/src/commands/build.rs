//! `pulse build`: digest to record, printed but not written.

use std::path::PathBuf;

use clap::Args;
use pulse_core::append::DIGEST_VALIDATION_FAILED;
use pulse_core::{load_digest, HeartbeatBuilder, HeartbeatRecord};
use serde::Serialize;

use super::{display, output, Session};

/// Arguments for `pulse build`.
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Digest JSON file
    #[arg(long)]
    pub digest: PathBuf,
}

#[derive(Debug, Serialize)]
struct BuildReport {
    digest: String,
    record: Option<HeartbeatRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    validation_errors: Vec<String>,
    strict_fail_count: usize,
    strict_fail_reasons: Vec<String>,
}

/// Run `pulse build`. In strict mode the record's own reasons fail the run.
pub fn run_build(args: &BuildArgs, session: &Session) -> u8 {
    let digest = match load_digest(&args.digest) {
        Ok(digest) => digest,
        Err(err) => return output::fail(&err.into()),
    };
    let report = match HeartbeatBuilder::new(&session.profile).build(&digest, session.now) {
        Ok(record) => BuildReport {
            digest: display(&args.digest),
            strict_fail_count: record.strict_fail_reasons.len(),
            strict_fail_reasons: record.strict_fail_reasons.clone(),
            validation_errors: Vec::new(),
            record: Some(record),
        },
        Err(errors) => BuildReport {
            digest: display(&args.digest),
            record: None,
            validation_errors: errors,
            strict_fail_count: 1,
            strict_fail_reasons: vec![DIGEST_VALIDATION_FAILED.to_string()],
        },
    };
    output::finish(session, &report, None)
}
