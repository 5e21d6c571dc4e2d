use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber at the configured level.
///
/// The level string doubles as an `EnvFilter` directive, so per-module
/// overrides like `info,authservice::oidc=trace` also work.
pub fn setup(log_level: &str) -> anyhow::Result<()> {
	let filter = EnvFilter::try_new(log_level)
		.map_err(|e| anyhow::anyhow!("invalid log level `{log_level}`: {e}"))?;
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.try_init()
		.map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
	Ok(())
}
