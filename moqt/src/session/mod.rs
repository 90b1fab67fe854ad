//! A MoQ Transport session over a single QUIC or WebTransport connection.
//!
//! After the setup exchange, both endpoints can publish and subscribe.
//! The session spawns a task that dispatches incoming streams until the connection is closed.
use std::sync::Arc;
use std::time::Duration;

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::sync::{watch, Mutex};

use crate::coding::Parameters;
use crate::message::{self, StreamType, SubscribeConfig, Version, Versions};
use crate::transport::{Connection, RecvStream, SendStream};
use crate::util::{spawn, OrClose};
use crate::{Error, Path};

mod announce;
mod fetch;
mod group;
mod info;
mod publisher;
mod queue;
mod reader;
mod scheduler;
mod stream;
mod subscribe;
mod subscribed;
mod subscriber;
mod writer;

#[cfg(test)]
mod test;

pub use announce::*;
pub use fetch::*;
pub use group::*;
pub use info::*;
pub use subscribe::*;
pub use subscribed::*;

use publisher::*;
use queue::*;
use scheduler::*;
use subscriber::*;

pub(crate) use reader::*;
pub(crate) use stream::*;
pub(crate) use writer::*;

/// Chosen by the application before the session is established.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
	/// Supported versions, in preferred order.
	pub versions: Versions,

	/// Sent in the setup message, e.g. [Parameters::PATH] or [Parameters::MAX_SUBSCRIBE_ID].
	pub parameters: Parameters,
}

/// An established session, acting as both publisher and subscriber.
#[derive(Clone)]
pub struct Session {
	conn: Arc<dyn Connection>,
	server: bool,

	version: Version,
	client_parameters: Parameters,
	server_parameters: Parameters,

	publisher: Publisher,
	subscriber: Subscriber,

	setup: Arc<Mutex<Writer>>,
	bitrate: watch::Receiver<Option<u64>>,
}

impl Session {
	#[tracing::instrument("session", skip_all, err)]
	pub async fn connect<C: Connection>(conn: C, config: SessionConfig) -> Result<Self, Error> {
		let conn: Arc<dyn Connection> = Arc::new(conn);

		match Self::connect_setup(&*conn, &config).await {
			Ok((stream, server)) => {
				let session = Self::new(conn, false, stream, server.version, config.parameters, server.params);
				Ok(session)
			}
			Err(err) => {
				conn.close(err.session_code().into(), &err.to_string());
				Err(err)
			}
		}
	}

	async fn connect_setup(conn: &dyn Connection, config: &SessionConfig) -> Result<(Stream, message::SessionServer), Error> {
		let mut stream = Stream::open(conn, StreamType::Session).await?;

		let client = message::SessionClient {
			versions: config.versions.clone(),
			params: config.parameters.clone(),
		};

		tracing::info!(versions = ?client.versions, "client setup");
		stream.writer.encode(&client).await.or_close(&mut stream)?;

		let server: message::SessionServer = stream.reader.decode().await.or_close(&mut stream)?;
		tracing::info!(version = ?server.version, "server setup");

		if !config.versions.contains(&server.version) {
			return Err(Error::Version(config.versions.clone(), [server.version].into()));
		}

		Ok((stream, server))
	}

	#[tracing::instrument("session", skip_all, err)]
	pub async fn accept<C: Connection>(conn: C, config: SessionConfig) -> Result<Self, Error> {
		let conn: Arc<dyn Connection> = Arc::new(conn);

		match Self::accept_setup(&*conn, &config).await {
			Ok((stream, client, version)) => {
				let session = Self::new(conn, true, stream, version, client.params, config.parameters);
				Ok(session)
			}
			Err(err) => {
				conn.close(err.session_code().into(), &err.to_string());
				Err(err)
			}
		}
	}

	async fn accept_setup(
		conn: &dyn Connection,
		config: &SessionConfig,
	) -> Result<(Stream, message::SessionClient, Version), Error> {
		let (send, recv) = conn.accept_bi().await?;

		let mut stream = Stream {
			writer: Writer::new(send, StreamType::Session),
			reader: Reader::new(recv, StreamType::Session),
		};

		let kind: StreamType = stream.reader.decode_silent().await?;
		if kind != StreamType::Session {
			return Err(Error::UnexpectedStream(kind));
		}

		let client: message::SessionClient = stream.reader.decode().await?;
		tracing::info!(versions = ?client.versions, "client setup");

		// The client's preference wins.
		let version = client
			.versions
			.select(&config.versions)
			.ok_or_else(|| Error::Version(client.versions.clone(), config.versions.clone()))?;

		let server = message::SessionServer {
			version,
			params: config.parameters.clone(),
		};

		tracing::info!(version = ?server.version, "server setup");
		stream.writer.encode(&server).await?;

		Ok((stream, client, version))
	}

	fn new(
		conn: Arc<dyn Connection>,
		server: bool,
		stream: Stream,
		version: Version,
		client_parameters: Parameters,
		server_parameters: Parameters,
	) -> Self {
		let (local, remote) = match server {
			true => (&server_parameters, &client_parameters),
			false => (&client_parameters, &server_parameters),
		};

		let scheduler = Scheduler::default();
		let publisher = Publisher::new(conn.clone(), scheduler.clone(), local.max_subscribe_id());
		let subscriber = Subscriber::new(conn.clone(), remote.max_subscribe_id());

		let Stream { writer, reader } = stream;
		let (bitrate_tx, bitrate_rx) = watch::channel(None);

		spawn(Self::run(
			conn.clone(),
			server,
			reader,
			bitrate_tx,
			publisher.clone(),
			subscriber.clone(),
			scheduler,
		));

		Self {
			conn,
			server,
			version,
			client_parameters,
			server_parameters,
			publisher,
			subscriber,
			setup: Arc::new(Mutex::new(writer)),
			bitrate: bitrate_rx,
		}
	}

	async fn run(
		conn: Arc<dyn Connection>,
		server: bool,
		mut setup: Reader,
		bitrate: watch::Sender<Option<u64>>,
		publisher: Publisher,
		subscriber: Subscriber,
		scheduler: Scheduler,
	) {
		let res = tokio::select! {
			res = Self::run_update(&mut setup, &bitrate) => res,
			res = Self::run_bi(&*conn, server, &publisher, &subscriber) => res,
			res = Self::run_uni(&*conn, &subscriber) => res,
			res = Self::run_datagrams(&*conn, &subscriber) => res,
			res = scheduler.run(&*conn) => res,
		};

		let err = res.err().unwrap_or(Error::Closed);
		match &err {
			Error::Transport(err) => tracing::info!(?err, "session closed"),
			err => tracing::warn!(?err, "session terminated"),
		}

		conn.close(err.session_code().into(), &err.to_string());

		publisher.close();
		subscriber.close();
	}

	async fn run_update(setup: &mut Reader, bitrate: &watch::Sender<Option<u64>>) -> Result<(), Error> {
		while let Some(update) = setup.decode_maybe::<message::SessionUpdate>().await? {
			bitrate.send_replace(Some(update.bitrate));
		}

		Ok(())
	}

	async fn run_bi(
		conn: &dyn Connection,
		server: bool,
		publisher: &Publisher,
		subscriber: &Subscriber,
	) -> Result<(), Error> {
		let mut tasks = FuturesUnordered::new();

		loop {
			tokio::select! {
				res = conn.accept_bi() => {
					let (send, recv) = res?;
					tasks.push(Self::run_control(send, recv, server, publisher, subscriber));
				},
				Some(res) = tasks.next() => Self::check(res)?,
			}
		}
	}

	async fn run_control(
		send: Box<dyn SendStream>,
		recv: Box<dyn RecvStream>,
		server: bool,
		publisher: &Publisher,
		subscriber: &Subscriber,
	) -> Result<(), Error> {
		let mut reader = Reader::new(recv, StreamType::Session);
		let kind: StreamType = reader.decode_silent().await?;

		if !kind.is_bidi() {
			return Err(Error::UnexpectedStream(kind));
		}

		let mut stream = Stream {
			writer: Writer::new(send, kind),
			reader,
		};
		stream.set_kind(kind);

		match kind {
			// Only the server migrates the session.
			StreamType::Session if !server => subscriber.recv_goaway(stream).await,
			StreamType::Announce => publisher.recv_announce(stream).await,
			StreamType::Subscribe => publisher.recv_subscribe(stream).await,
			StreamType::Info => publisher.recv_info(stream).await,
			StreamType::Fetch => publisher.recv_fetch(stream).await,
			_ => Err(Error::UnexpectedStream(kind)),
		}
	}

	async fn run_uni(conn: &dyn Connection, subscriber: &Subscriber) -> Result<(), Error> {
		let mut tasks = FuturesUnordered::new();

		loop {
			tokio::select! {
				res = conn.accept_uni() => {
					let recv = res?;
					tasks.push(Self::run_group(recv, subscriber));
				},
				Some(res) = tasks.next() => Self::check(res)?,
			}
		}
	}

	async fn run_group(recv: Box<dyn RecvStream>, subscriber: &Subscriber) -> Result<(), Error> {
		let mut reader = Reader::new(recv, StreamType::Group);
		let kind: StreamType = reader.decode_silent().await?;

		if kind != StreamType::Group {
			return Err(Error::UnexpectedStream(kind));
		}

		subscriber.recv_group(reader).await
	}

	async fn run_datagrams(conn: &dyn Connection, subscriber: &Subscriber) -> Result<(), Error> {
		loop {
			let datagram = conn.recv_datagram().await?;
			subscriber.recv_datagram(datagram)?;
		}
	}

	// Stream errors stay with the stream; only protocol violations end the session.
	fn check(res: Result<(), Error>) -> Result<(), Error> {
		match res {
			Err(err) if err.is_fatal() => Err(err),
			Err(err) => {
				tracing::warn!(?err, "stream error");
				Ok(())
			}
			Ok(()) => Ok(()),
		}
	}

	pub fn version(&self) -> Version {
		self.version
	}

	pub fn client_parameters(&self) -> &Parameters {
		&self.client_parameters
	}

	pub fn server_parameters(&self) -> &Parameters {
		&self.server_parameters
	}

	/// Discover any tracks announced under a prefix.
	pub async fn announced(&self, prefix: Path, params: Parameters) -> Result<AnnounceReceiver, Error> {
		self.subscriber.announced(prefix, params).await
	}

	pub async fn subscribe(&self, path: Path, config: SubscribeConfig) -> Result<Subscribe, Error> {
		self.subscriber.subscribe(path, config).await
	}

	pub async fn info(&self, path: Path) -> Result<message::Info, Error> {
		self.subscriber.info(path).await
	}

	pub async fn fetch(&self, request: message::Fetch) -> Result<FetchReader, Error> {
		self.subscriber.fetch(request).await
	}

	/// The next announce interest from the peer.
	pub async fn accept_announce(&self) -> Result<AnnounceSender, Error> {
		self.publisher.accept_announce().await
	}

	pub async fn accept_subscribe(&self) -> Result<Subscribed, Error> {
		self.publisher.accept_subscribe().await
	}

	pub async fn accept_info(&self) -> Result<InfoRequested, Error> {
		self.publisher.accept_info().await
	}

	pub async fn accept_fetch(&self) -> Result<FetchRequested, Error> {
		self.publisher.accept_fetch().await
	}

	/// Tell the peer our estimated bitrate.
	pub async fn update(&self, bitrate: u64) -> Result<(), Error> {
		self.setup.lock().await.encode(&message::SessionUpdate { bitrate }).await
	}

	/// The bitrate most recently reported by the peer.
	pub fn peer_bitrate(&self) -> Option<u64> {
		*self.bitrate.borrow()
	}

	/// Ask the client to migrate to a new URI, terminating the session if it hasn't left by the timeout.
	pub async fn go_away(&self, uri: &str, timeout: Duration) -> Result<(), Error> {
		if !self.server {
			return Err(Error::ProtocolViolation("goaway sent by client"));
		}

		let mut stream = Stream::open(&*self.conn, StreamType::Session).await?;
		stream
			.writer
			.encode(&message::GoAway { uri: uri.to_string() })
			.await
			.or_close(&mut stream)?;
		stream.writer.finish()?;

		let conn = self.conn.clone();
		spawn(async move {
			tokio::select! {
				_ = tokio::time::sleep(timeout) => {
					let err = Error::GoAwayTimeout;
					tracing::warn!("goaway timeout");
					conn.close(err.session_code().into(), &err.to_string());
				},
				_ = conn.closed() => {},
			}
		});

		Ok(())
	}

	/// Resolves with the new URI when the server asks us to migrate, or None if the session closes first.
	pub async fn goaway(&self) -> Option<String> {
		tokio::select! {
			uri = self.subscriber.goaway() => uri,
			_ = self.conn.closed() => None,
		}
	}

	/// Close the connection with the error's session code.
	pub fn terminate(&self, err: Error) {
		tracing::info!(?err, "terminate");
		self.conn.close(err.session_code().into(), &err.to_string());
	}

	/// Resolves with the reason once the session is gone.
	pub async fn closed(&self) -> Error {
		Error::Transport(self.conn.closed().await)
	}
}
