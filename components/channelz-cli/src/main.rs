mod channelz;
mod cli;
mod helpers;
mod instrumentation;
mod models;
mod proto;
mod render;
mod runtime;

use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse errors exit 1, help and --version exit 0
    let cli = match cli::cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Nothing left to report to if stdout/stderr are gone
            e.print().ok();
            return ExitCode::from(cli::cli::parse_error_exit_code(&e));
        }
    };

    // The CLI layer loads configuration, installs tracing and dispatches the command
    match cli::cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
