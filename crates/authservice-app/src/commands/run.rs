use authservice::config::Config;
use authservice::{service, telemetry};

use crate::ConfigArgs;

pub(crate) fn execute(config_args: ConfigArgs, validate_only: bool) -> anyhow::Result<()> {
	let contents = fs_err::read_to_string(&config_args.file)?;
	let config = Config::parse(&contents)?;
	if validate_only {
		println!("configuration is valid");
		return Ok(());
	}

	telemetry::setup(&config.log_level)?;

	let mut builder = tokio::runtime::Builder::new_multi_thread();
	builder.enable_all();
	if let Some(threads) = config.threads {
		builder.worker_threads(threads);
	}
	builder.build()?.block_on(service::serve(config))
}
