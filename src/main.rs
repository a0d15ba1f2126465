//! Sitepipe - command-line front-end asset build pipeline

use std::process::ExitCode;

use sitepipe::cli;

fn main() -> ExitCode {
    cli::run()
}
