use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Default filter directive for a `-v` count.
pub fn default_filter(verbosity: u8) -> &'static str {
	// 0 = warnings only (attempt retries and teardown failures)
	// 1 (-v) = lifecycle: listener up, attempts, established
	// 2+ (-vv) = socket-level detail
	match verbosity {
		0 => "warn",
		1 => "info",
		_ => "debug",
	}
}

pub fn init_logging(verbosity: u8) {
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

	let stderr = std::io::stderr.with_max_level(tracing::Level::TRACE);

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(stderr)
		.with_target(true)
		.with_level(true)
		.compact()
		.init();
}
