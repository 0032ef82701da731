use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber, writing to stderr so stdout stays chat-only.
///
/// `RUST_LOG` wins over the `-v` count when set.
pub fn init_logging(verbose: u8) {
	let level = match verbose {
		0 => "warn",
		1 => "info",
		2 => "debug",
		_ => "trace",
	};
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

	let layer = fmt::layer().with_writer(std::io::stderr).with_target(verbose >= 2);

	let _ = tracing_subscriber::registry().with(filter).with(layer).try_init();
}
