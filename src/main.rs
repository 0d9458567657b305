//! copilot-daemon CLI entry point

use std::process::ExitCode;

use clap::Parser;

use copilot_daemon::cli::{Cli, Commands};
use copilot_daemon::commands::{
    run_config, run_logs, run_start, run_status, run_stop, run_version, CommandContext,
};

fn main() -> ExitCode {
    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> copilot_daemon::Result<String> {
    let cli = Cli::parse();
    let ctx = CommandContext::new(cli.config.as_deref());

    match &cli.command {
        Commands::Start => run_start(&ctx),
        Commands::Status => run_status(&ctx),
        Commands::Stop => run_stop(&ctx),
        Commands::Logs => run_logs(&ctx),
        Commands::Version => run_version(),
        Commands::Config(args) => run_config(&ctx, &args.operation),
    }
}
