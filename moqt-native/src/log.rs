use serde::{Deserialize, Serialize};
use serde_with::DisplayFromStr;
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
	#[default]
	Full,
	Compact,
}

#[serde_with::serde_as]
#[derive(Clone, clap::Args, Serialize, Deserialize, Debug)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
	/// The default level; RUST_LOG takes precedence.
	#[serde_as(as = "DisplayFromStr")]
	#[arg(id = "log-level", long = "log-level", default_value = "info")]
	pub level: Level,

	#[arg(id = "log-format", long = "log-format", value_enum, default_value_t)]
	pub format: LogFormat,

	/// Log every control message sent and received.
	#[arg(id = "log-wire", long = "log-wire")]
	pub wire: bool,
}

impl Default for Log {
	fn default() -> Self {
		Self {
			level: Level::INFO,
			format: LogFormat::Full,
			wire: false,
		}
	}
}

impl Log {
	pub fn level(&self) -> LevelFilter {
		LevelFilter::from_level(self.level)
	}

	fn filter(&self) -> anyhow::Result<EnvFilter> {
		let mut filter = EnvFilter::builder()
			.with_default_directive(self.level().into())
			.from_env_lossy()
			.add_directive("quinn=info".parse()?)
			.add_directive("web_transport_quinn=info".parse()?)
			.add_directive("rustls=warn".parse()?);

		// Codec messages are logged at debug, which is far too chatty by default.
		if !self.wire {
			filter = filter.add_directive("moqt::session::reader=info".parse()?);
			filter = filter.add_directive("moqt::session::writer=info".parse()?);
		}

		Ok(filter)
	}

	/// Install a global subscriber that writes to stderr.
	pub fn init(&self) -> anyhow::Result<()> {
		let builder = tracing_subscriber::fmt()
			.with_writer(std::io::stderr)
			.with_env_filter(self.filter()?);

		match self.format {
			LogFormat::Full => tracing::subscriber::set_global_default(builder.finish())?,
			LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish())?,
		}

		Ok(())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn wire_directives() {
		let quiet = Log::default().filter().unwrap().to_string();
		assert!(quiet.contains("moqt::session::reader=info"));

		let wire = Log {
			wire: true,
			..Default::default()
		};
		assert!(!wire.filter().unwrap().to_string().contains("moqt::session::reader"));
	}
}
