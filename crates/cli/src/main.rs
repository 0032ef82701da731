use std::process::ExitCode;

use anyhow::Context;
use campulse_cli::cli::Cli;
use campulse_cli::output::Printer;
use campulse_cli::{commands, logging, settings};
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	match run(cli).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!(target = "campulse.cli", error = %err, "command failed");
			eprintln!("error: {err:#}");
			ExitCode::FAILURE
		}
	}
}

async fn run(cli: Cli) -> anyhow::Result<()> {
	let config = settings::resolve(cli.config.as_deref(), &cli.overrides).context("loading configuration")?;
	let printer = Printer::new(cli.format);
	commands::dispatch(cli.command, config, printer).await?;
	Ok(())
}
