//! `pulse parity`: compacted-versus-raw audit.

use std::path::PathBuf;

use clap::Args;
use pulse_core::{check_parity, read_ledger, WindowSpec};

use super::{display, output, Session};

/// Arguments for `pulse parity`.
#[derive(Args, Debug)]
pub struct ParityArgs {
    /// Raw ledger
    #[arg(long)]
    pub raw: PathBuf,

    /// Compacted ledger
    #[arg(long)]
    pub compacted: PathBuf,

    /// Trailing raw records to audit [default: whole ledger]
    #[arg(long, allow_negative_numbers = true)]
    pub last: Option<i64>,
}

/// Run `pulse parity`.
pub fn run_parity(args: &ParityArgs, session: &Session) -> u8 {
    let spec = match WindowSpec::from_arg(args.last) {
        Ok(spec) => spec,
        Err(err) => return output::fail(&err.into()),
    };
    let (raw, compacted) = match (read_ledger(&args.raw), read_ledger(&args.compacted)) {
        (Ok(raw), Ok(compacted)) => (raw, compacted),
        (Err(err), _) | (_, Err(err)) => return output::fail(&err.into()),
    };
    let mut report = check_parity(&raw, &compacted, spec, &session.profile, session.now);
    report.raw = Some(display(&args.raw));
    report.compacted = Some(display(&args.compacted));
    output::finish(session, &report, None)
}
