//! pulse - heartbeat ledger CLI
//!
//! Builds heartbeats from monitor digests, appends them to raw ledgers,
//! compacts and audits ledgers, and chains monitors of monitors. Every
//! invocation prints exactly one JSON object on stdout.

use std::panic::{self, AssertUnwindSafe};

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{output, GlobalArgs};

/// pulse - heartbeat ledger append / compact / verify
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a heartbeat record from a digest and print it (no write)
    Build(commands::build::BuildArgs),

    /// Build a heartbeat from a digest and append it to a raw ledger
    Append(commands::append::AppendArgs),

    /// Summarize the health of a ledger's trailing window
    Window(commands::window::WindowArgs),

    /// Rewrite the compacted ledger from the raw ledger
    Compact(commands::compact::CompactArgs),

    /// Audit a compacted ledger against its raw ledger
    Parity(commands::parity::ParityArgs),

    /// Reduce a report to a digest one tier up
    Rollup(commands::rollup::RollupArgs),

    /// Evaluate a stack of tier ledgers, feeding each into the next
    Chain(commands::chain::ChainArgs),
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => std::process::exit(i32::from(output::usage_error(&err))),
    };

    // stdout carries the JSON contract; logs go to stderr
    let filter =
        EnvFilter::try_new(&cli.global.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let exit_code = panic::catch_unwind(AssertUnwindSafe(|| run(&cli)))
        .unwrap_or_else(|payload| output::panic_report(payload.as_ref()));
    std::process::exit(i32::from(exit_code));
}

fn run(cli: &Cli) -> u8 {
    let session = match commands::Session::load(&cli.global) {
        Ok(session) => session,
        Err(err) => return output::fail(&err.into()),
    };

    match &cli.command {
        Commands::Build(args) => commands::build::run_build(args, &session),
        Commands::Append(args) => commands::append::run_append(args, &session),
        Commands::Window(args) => commands::window::run_window(args, &session),
        Commands::Compact(args) => commands::compact::run_compact(args, &session),
        Commands::Parity(args) => commands::parity::run_parity(args, &session),
        Commands::Rollup(args) => commands::rollup::run_rollup(args, &session),
        Commands::Chain(args) => commands::chain::run_chain(args, &session),
    }
}
