use moqt::{
	Error, FetchRequested, GroupReader, GroupWriter, InfoRequested, Session, SessionConfig, Subscribe, Subscribed,
};

use crate::Origins;

/// A single peer of the relay, which may publish, subscribe, or both.
pub struct Connection {
	id: u64,
	origins: Origins,
}

impl Connection {
	pub fn new(id: u64, origins: Origins) -> Self {
		Self { id, origins }
	}

	/// Perform the server handshake, then serve the peer until it disconnects.
	pub async fn accept<C: moqt::transport::Connection>(self, conn: C, config: SessionConfig) {
		match Session::accept(conn, config).await {
			Ok(session) => self.run(session).await,
			Err(err) => tracing::warn!(id = self.id, ?err, "failed to accept session"),
		}
	}

	#[tracing::instrument("session", skip_all, fields(id = self.id))]
	pub async fn run(self, session: Session) {
		let publish = async {
			// A peer that refuses our announce interest can still subscribe.
			if let Err(err) = self.origins.publish(self.id, session.clone()).await {
				tracing::debug!(?err, "stopped publishing");
			}
			std::future::pending::<()>().await;
		};

		let res = tokio::select! {
			_ = publish => Ok(()),
			res = self.run_announces(&session) => res,
			res = self.run_subscribes(&session) => res,
			res = self.run_infos(&session) => res,
			res = self.run_fetches(&session) => res,
			err = session.closed() => Err(err),
		};

		match res {
			Err(Error::Transport(err)) => tracing::info!(?err, "session closed"),
			Err(err) => tracing::warn!(?err, "session error"),
			Ok(()) => {}
		}
	}

	async fn run_announces(&self, session: &Session) -> Result<(), Error> {
		loop {
			let interest = session.accept_announce().await?;
			let origins = self.origins.clone();

			tokio::spawn(async move {
				if let Err(err) = origins.serve_announcements(interest).await {
					tracing::debug!(?err, "announce interest closed");
				}
			});
		}
	}

	async fn run_subscribes(&self, session: &Session) -> Result<(), Error> {
		loop {
			let subscribed = session.accept_subscribe().await?;
			let origins = self.origins.clone();

			tokio::spawn(async move { origins.serve_track(subscribed).await });
		}
	}

	async fn run_infos(&self, session: &Session) -> Result<(), Error> {
		loop {
			let request = session.accept_info().await?;
			tokio::spawn(forward_info(self.origins.clone(), request));
		}
	}

	async fn run_fetches(&self, session: &Session) -> Result<(), Error> {
		loop {
			let request = session.accept_fetch().await?;
			tokio::spawn(forward_fetch(self.origins.clone(), request));
		}
	}
}

/// Subscribe to the same track on the origin and copy everything it sends.
#[tracing::instrument("subscribe", skip_all, fields(path = %subscribed.path()))]
pub(crate) async fn forward_subscribe(origin: Session, mut subscribed: Subscribed) {
	let mut upstream = match origin.subscribe(subscribed.path().clone(), subscribed.current()).await {
		Ok(upstream) => upstream,
		Err(err) => return subscribed.close_with_error(err).await,
	};

	match run_subscribe(&mut subscribed, &mut upstream).await {
		Ok(()) => {
			let _ = upstream.close();
			let _ = subscribed.close().await;
		}
		Err(err) => {
			tracing::debug!(?err, "subscribe error");
			upstream.close_with_error(err.clone());
			subscribed.close_with_error(err).await;
		}
	}
}

async fn run_subscribe(subscribed: &mut Subscribed, upstream: &mut Subscribe) -> Result<(), Error> {
	subscribed.accept(upstream.info().clone()).await?;

	loop {
		tokio::select! {
			res = upstream.accept_group() => {
				let group = match res {
					Ok(group) => group,
					Err(Error::Closed) => return Ok(()),
					Err(err) => return Err(err),
				};

				let writer = subscribed.open_group(group.sequence(), group.priority()).await?;
				tokio::spawn(forward_group(group, writer));
			}
			Ok(datagram) = upstream.accept_datagram() => {
				subscribed.send_datagram(datagram.info.sequence, datagram.info.priority, datagram.payload)?;
			}
			update = subscribed.updated() => match update {
				Some(config) => upstream.update(config).await?,
				None => return Ok(()),
			},
		}
	}
}

async fn forward_group(mut reader: GroupReader, mut writer: GroupWriter) {
	let res = async {
		while let Some(frame) = reader.read_frame().await? {
			writer.write_frame(frame).await?;
		}
		Ok::<_, Error>(())
	}
	.await;

	match res {
		Ok(()) => {
			let _ = writer.close();
		}
		Err(err) => {
			tracing::debug!(sequence = reader.sequence(), ?err, "group error");
			writer.cancel(err.clone());
			reader.cancel(err);
		}
	}
}

#[tracing::instrument("info", skip_all, fields(path = %request.path()))]
async fn forward_info(origins: Origins, request: InfoRequested) {
	let Some(origin) = origins.route(request.path()) else {
		return request.reject(Error::NotFound);
	};

	match origin.info(request.path().clone()).await {
		Ok(info) => {
			if let Err(err) = request.respond(info).await {
				tracing::debug!(?err, "info error");
			}
		}
		Err(err) => request.reject(err),
	}
}

#[tracing::instrument("fetch", skip_all, fields(path = %request.path()))]
async fn forward_fetch(origins: Origins, request: FetchRequested) {
	let Some(origin) = origins.route(request.path()) else {
		return request.reject(Error::NotFound);
	};

	let mut upstream = match origin.fetch(request.request().clone()).await {
		Ok(upstream) => upstream,
		Err(err) => return request.reject(err),
	};

	let mut writer = match request.accept(upstream.info().priority).await {
		Ok(writer) => writer,
		Err(err) => return upstream.cancel(err),
	};

	let res = async {
		while let Some(frame) = upstream.read_frame().await? {
			writer.write_frame(frame).await?;
		}
		Ok::<_, Error>(())
	}
	.await;

	match res {
		Ok(()) => {
			let _ = writer.close();
		}
		Err(err) => {
			tracing::debug!(?err, "fetch error");
			writer.cancel(err.clone());
			upstream.cancel(err);
		}
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use bytes::Bytes;

	use moqt::message::{self, GroupOrder, SubscribeConfig};
	use moqt::transport::memory::MemoryConnection;
	use moqt::{Parameters, Path};

	use super::*;

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	// Connect a client session to the relay.
	async fn join(origins: &Origins, id: u64) -> Session {
		let (a, b) = MemoryConnection::pair();
		tokio::spawn(Connection::new(id, origins.clone()).accept(b, SessionConfig::default()));
		Session::connect(a, SessionConfig::default()).await.unwrap()
	}

	fn info() -> message::Info {
		message::Info {
			priority: 0,
			latest: 2,
			order: GroupOrder::Ascending,
			expires: Duration::ZERO,
		}
	}

	#[tokio::test]
	async fn relay() {
		tokio::time::pause();

		let origins = Origins::new();
		let publisher = join(&origins, 0).await;
		let subscriber = join(&origins, 1).await;

		let path = Path::from("room/alice");

		let mut announce = publisher.accept_announce().await.unwrap();
		announce.active(path.clone(), Parameters::new()).await.unwrap();
		announce.live(Parameters::new()).await.unwrap();
		settle().await;

		let mut announced = subscriber.announced(Path::from("room"), Parameters::new()).await.unwrap();
		assert_eq!(announced.receive_announcements().await.unwrap(), vec![Path::from("alice")]);

		let accept = async {
			let mut subscribed = publisher.accept_subscribe().await?;
			subscribed.accept(info()).await?;
			Ok::<_, Error>(subscribed)
		};

		let (subscribe, subscribed) = tokio::join!(subscriber.subscribe(path.clone(), SubscribeConfig::default()), accept);
		let subscribe = subscribe.unwrap();
		let mut subscribed = subscribed.unwrap();

		assert_eq!(subscribe.info().latest, 2);

		let mut group = subscribed.open_group(2, 0).await.unwrap();
		group.write_frame(Bytes::from_static(b"hello")).await.unwrap();
		group.close().unwrap();

		let mut group = subscribe.accept_group().await.unwrap();
		assert_eq!(group.sequence(), 2);
		assert_eq!(group.read_all().await.unwrap(), vec![Bytes::from_static(b"hello")]);

		// The origin's info is forwarded verbatim.
		let respond = async { publisher.accept_info().await?.respond(info()).await };
		let (res, responded) = tokio::join!(subscriber.info(path.clone()), respond);
		responded.unwrap();
		assert_eq!(res.unwrap(), info());
	}

	#[tokio::test]
	async fn not_found() {
		tokio::time::pause();

		let origins = Origins::new();
		let subscriber = join(&origins, 0).await;

		let res = subscriber.subscribe(Path::from("missing/track"), SubscribeConfig::default()).await;
		let code = moqt::SubscribeErrorCode::TrackDoesNotExist.into();
		assert!(matches!(res, Err(Error::Remote(c)) if c == code));

		let res = subscriber.info(Path::from("missing/track")).await;
		assert!(matches!(res, Err(Error::Remote(_))));
	}
}
