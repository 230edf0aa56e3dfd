//! iacfacts CLI entry point.

use clap::Parser;
use iacfacts::cli::{self, Cli, Commands, EXIT_ERROR};

fn main() {
    iacfacts::init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Analyze(args) => match cli::run_analyze(&args) {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_ERROR
            }
        },
        Commands::Dialects => match cli::run_dialects() {
            Ok(code) => code,
            Err(e) => {
                eprintln!("Error: {}", e);
                EXIT_ERROR
            }
        },
    };

    std::process::exit(exit_code);
}
