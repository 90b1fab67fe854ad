mod config;
mod connection;
mod origins;

pub use config::*;
pub use connection::*;
pub use origins::*;

use anyhow::Context;
use moqt::{Parameters, SessionConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = Config::load()?;

	let mut session = SessionConfig::default();
	if let Some(max) = config.relay.max_subscribes {
		session.parameters.set_uint(Parameters::MAX_SUBSCRIBE_ID, max);
	}

	let mut server = config.server.init().context("failed to start server")?;
	tracing::info!(addr = %server.local_addr()?, fingerprints = ?server.fingerprints(), "listening");

	let origins = Origins::new();
	let mut id = 0;

	while let Some(conn) = server.accept().await {
		tracing::info!(id, url = %conn.url(), "accepted");

		let connection = Connection::new(id, origins.clone());
		tokio::spawn(connection.accept(conn, session.clone()));
		id += 1;
	}

	Ok(())
}
