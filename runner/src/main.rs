use clap::Parser;
use jobchain::{cli::Cli, logging};
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    logging::init();

    match Cli::parse().command.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", logging::report(&e));

            ExitCode::FAILURE
        }
    }
}
