use std::process::ExitCode;

use clap::Parser;

use signstudio::cli::{self, CliArgs};
use signstudio::logger;

fn main() -> ExitCode {
    // Initialize session log (overwrites previous session log)
    logger::init();

    let args = CliArgs::parse();
    cli::run(args)
}
