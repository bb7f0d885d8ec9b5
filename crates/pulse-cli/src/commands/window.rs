//! `pulse window`: trailing-window health report.

use std::path::PathBuf;

use clap::Args;
use pulse_core::{evaluate_window, read_ledger, WindowSpec};

use super::{display, output, Session};

/// Arguments for `pulse window`.
#[derive(Args, Debug)]
pub struct WindowArgs {
    /// Ledger to evaluate
    #[arg(long)]
    pub ledger: PathBuf,

    /// Trailing records to evaluate [default: whole ledger]
    #[arg(long, allow_negative_numbers = true)]
    pub last: Option<i64>,
}

/// Run `pulse window`.
pub fn run_window(args: &WindowArgs, session: &Session) -> u8 {
    let spec = match WindowSpec::from_arg(args.last) {
        Ok(spec) => spec,
        Err(err) => return output::fail(&err.into()),
    };
    let scan = match read_ledger(&args.ledger) {
        Ok(scan) => scan,
        Err(err) => return output::fail(&err.into()),
    };
    let mut report = evaluate_window(&scan, spec, &session.profile, session.now);
    report.ledger = Some(display(&args.ledger));
    output::finish(session, &report, None)
}
