use clap::Parser;
use colored::Colorize;
use jsbridge_cli::{cli::Cli, error::CliError, logging, run};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	if let Err(err) = run::run(cli).await {
		report(&err);
		let code = if matches!(err, CliError::Interrupted) { 130 } else { 1 };
		std::process::exit(code);
	}
}

fn report(err: &CliError) {
	eprintln!("{} {}", "error:".red().bold(), err.report());
	if let Some(hint) = err.hint() {
		eprintln!("  {} {hint}", "hint:".yellow().bold());
	}
}
