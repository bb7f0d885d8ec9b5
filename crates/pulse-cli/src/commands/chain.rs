//! `pulse chain`: heartbeat of heartbeats.

use std::path::PathBuf;

use clap::Args;
use pulse_core::{Chain, WindowSpec, WindowStage};

use super::{output, Session};

/// Arguments for `pulse chain`.
#[derive(Args, Debug)]
pub struct ChainArgs {
    /// Tier ledgers, base first; repeat for each tier (at least two)
    #[arg(long = "ledger", required = true, num_args = 1)]
    pub ledgers: Vec<PathBuf>,

    /// Trailing records evaluated at every tier [default: whole ledger]
    #[arg(long, allow_negative_numbers = true)]
    pub last: Option<i64>,
}

/// Run `pulse chain`.
pub fn run_chain(args: &ChainArgs, session: &Session) -> u8 {
    let spec = match WindowSpec::from_arg(args.last) {
        Ok(spec) => spec,
        Err(err) => return output::fail(&err.into()),
    };
    let chain = Chain::new(
        WindowStage { spec },
        session.profile.clone(),
        args.ledgers.clone(),
    );
    match chain.run(session.now) {
        Ok(run) => output::finish(session, &run.report, run.failure.map(Into::into)),
        Err(err) => output::fail(&err.into()),
    }
}
