use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Install the process-wide tracing subscriber. Filter is taken from
/// `RUST_LOG`, falling back to `info`. Safe to call more than once; later
/// calls are ignored (useful for tests).
pub fn setup_logging() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().with_target(true))
		.try_init();
}
