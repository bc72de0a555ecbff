//! dsync command line client
//!
//! Takes a named distributed lock, works with the value it carries and
//! releases it again. Every invocation is a fresh session.

mod cli;
mod commands;
mod logging;

use std::process::ExitCode;

use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = logging::init_logging(&cli.log_level) {
        eprintln!("failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }
    dsync_core::metrics::init_metrics();

    match commands::run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("dsync: {e:#}");
            ExitCode::FAILURE
        }
    }
}
