//! Logging setup for the gitsniff binary

use tracing_subscriber::EnvFilter;

/// Initialize console logging on stderr.
///
/// stdout is reserved for findings. `RUST_LOG` overrides the default level.
pub fn init_cli_logging(verbose: bool) {
  let level = if verbose {
    tracing::Level::DEBUG
  } else {
    tracing::Level::INFO
  };

  let env_filter = EnvFilter::builder()
    .with_default_directive(level.into())
    .from_env_lossy();

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_target(verbose)
    .with_writer(std::io::stderr)
    .init();
}
