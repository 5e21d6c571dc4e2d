use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser};

mod commands;

#[derive(ClapArgs, Debug, Clone)]
pub(crate) struct ConfigArgs {
	/// Path to the filter configuration file (JSON or YAML).
	#[arg(
		short,
		long,
		value_name = "file",
		default_value = "/etc/authservice/config.json"
	)]
	pub(crate) file: PathBuf,
}

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Cli {
	#[command(flatten)]
	config: ConfigArgs,

	/// Parse and validate the configuration, then exit.
	#[arg(long, value_name = "validate-only")]
	validate_only: bool,
}

pub fn run() -> anyhow::Result<()> {
	let args = Cli::parse();
	commands::run::execute(args.config, args.validate_only)
}
