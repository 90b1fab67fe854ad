use std::path::PathBuf;

use clap::Parser;
use figment::{
	providers::{Env, Format, Serialized, Toml},
	Figment,
};
use serde::{Deserialize, Serialize};

#[derive(Parser, Clone, Deserialize, Serialize, Debug, Default)]
#[serde(default)]
pub struct Config {
	/// Path to a TOML config file.
	#[arg(long)]
	#[serde(skip)]
	pub config: Option<PathBuf>,

	#[command(flatten)]
	pub server: moqt_native::ServerConfig,

	#[command(flatten)]
	pub log: moqt_native::Log,

	#[command(flatten)]
	pub relay: RelayConfig,
}

impl Config {
	/// The command line, then the TOML file, then `MOQT_` environment variables, each overriding the last.
	pub fn load() -> anyhow::Result<Self> {
		let args = Config::parse();

		let mut figment = Figment::new().merge(Serialized::defaults(&args));
		if let Some(path) = &args.config {
			figment = figment.merge(Toml::file(path));
		}

		let config: Config = figment.merge(Env::prefixed("MOQT_").split("__")).extract()?;
		config.log.init()?;

		tracing::debug!(?config, "loaded config");
		Ok(config)
	}
}

#[derive(clap::Args, Clone, Serialize, Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, default)]
pub struct RelayConfig {
	/// Cap the number of subscriptions each peer may open.
	#[arg(long = "max-subscribes")]
	pub max_subscribes: Option<u64>,
}
