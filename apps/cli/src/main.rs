//! docforge CLI — local one-shot `llms.txt` generator.
//!
//! Crawls a documentation site and writes `llms.txt` (and optionally
//! `llms-full.txt`) to disk without involving the Job Manager or HTTP API
//! used by `docforge-server` — a single job, run to completion in-process.

mod commands;

use std::process::ExitCode;

use clap::Parser;
use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    if color_eyre::install().is_err() {
        eprintln!("warning: failed to install error handler");
    }

    let cli = Cli::parse();
    commands::init_tracing(&cli);

    match commands::run(cli).await {
        Ok(code) => code,
        Err(report) => {
            eprintln!("error: {report:?}");
            ExitCode::from(1)
        }
    }
}
