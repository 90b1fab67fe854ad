use std::collections::HashMap;
use std::sync::{atomic, Arc};

use bytes::Bytes;
use tokio::sync::watch;

use crate::coding::{Decode, Parameters};
use crate::message::{self, StreamType, SubscribeConfig};
use crate::transport::Connection;
use crate::util::{Close, Lock, OrClose};
use crate::{Error, GroupErrorCode, Path};

use super::{AnnounceReceiver, Datagram, FetchReader, GroupReader, Reader, Stream, Subscribe, SubscribeState};

// Requests we make of the peer, and the routing of the groups it sends back.
#[derive(Clone)]
pub(super) struct Subscriber {
	conn: Arc<dyn Connection>,

	// The cap advertised by the peer, if any.
	max_subscribe_id: Option<u64>,
	next_id: Arc<atomic::AtomicU64>,

	subscriptions: Lock<HashMap<u64, SubscribeState>>,
	goaway: Arc<watch::Sender<Option<String>>>,
}

impl Subscriber {
	pub fn new(conn: Arc<dyn Connection>, max_subscribe_id: Option<u64>) -> Self {
		let (goaway, _) = watch::channel(None);

		Self {
			conn,
			max_subscribe_id,
			next_id: Default::default(),
			subscriptions: Default::default(),
			goaway: Arc::new(goaway),
		}
	}

	/// Discover any tracks matching a prefix.
	pub async fn announced(&self, prefix: Path, params: Parameters) -> Result<AnnounceReceiver, Error> {
		let mut stream = Stream::open(&*self.conn, StreamType::Announce).await?;

		let request = message::AnnouncePlease {
			prefix: prefix.clone(),
			params,
		};

		stream.writer.encode(&request).await.or_close(&mut stream)?;

		Ok(AnnounceReceiver::start(self.conn.clone(), prefix, stream))
	}

	// Allocate the next id, unless that would exceed the peer's cap.
	fn allocate_id(&self) -> Result<u64, Error> {
		let max = self.max_subscribe_id.unwrap_or(u64::MAX);

		self.next_id
			.fetch_update(atomic::Ordering::Relaxed, atomic::Ordering::Relaxed, |id| {
				(id < max).then_some(id + 1)
			})
			.map_err(|_| Error::TooManySubscribes)
	}

	#[tracing::instrument("subscribe", skip_all, err, fields(%path))]
	pub async fn subscribe(&self, path: Path, config: SubscribeConfig) -> Result<Subscribe, Error> {
		if !config.range.is_valid() {
			return Err(Error::InvalidRange);
		}

		let id = self.allocate_id()?;

		let request = message::Subscribe {
			id,
			path,
			priority: config.priority,
			order: config.order,
			expires: config.expires,
			range: config.range,
			params: config.params,
		};

		// Register first so groups that race the Info reply have somewhere to go.
		let state = SubscribeState::new(request.range, request.order);
		self.subscriptions.lock().insert(id, state.clone());

		let res = self.run_subscribe(&request).await;
		match res {
			Ok((info, stream)) => {
				tracing::info!(?info, "active");
				Ok(Subscribe::start(request, info, stream, state, self.subscriptions.clone()))
			}
			Err(err) => {
				self.subscriptions.lock().remove(&id);
				Err(err)
			}
		}
	}

	async fn run_subscribe(&self, request: &message::Subscribe) -> Result<(message::Info, Stream), Error> {
		let mut stream = Stream::open(&*self.conn, StreamType::Subscribe).await?;

		stream.writer.encode(request).await.or_close(&mut stream)?;
		let info = stream.reader.decode().await.or_close(&mut stream)?;

		Ok((info, stream))
	}

	/// Ask for the latest information about a track, without subscribing.
	pub async fn info(&self, path: Path) -> Result<message::Info, Error> {
		let mut stream = Stream::open(&*self.conn, StreamType::Info).await?;

		let res: Result<message::Info, Error> = async {
			stream.writer.encode(&message::InfoRequest { path }).await?;
			let info = stream.reader.decode().await?;
			stream.writer.finish()?;
			Ok(info)
		}
		.await;

		res.or_close(&mut stream)
	}

	/// Request a single group, starting at a frame offset.
	pub async fn fetch(&self, request: message::Fetch) -> Result<FetchReader, Error> {
		let mut stream = Stream::open(&*self.conn, StreamType::Fetch).await?;

		let res: Result<message::Group, Error> = async {
			stream.writer.encode(&request).await?;
			stream.reader.decode::<message::Group>().await
		}
		.await;

		let info = res.or_close(&mut stream)?;
		let Stream { writer, reader } = stream;

		let group = GroupReader::new(info, reader).starting_at(request.frame);
		Ok(FetchReader::new(group, writer))
	}

	#[tracing::instrument("group", skip_all, err)]
	pub async fn recv_group(&self, mut reader: Reader) -> Result<(), Error> {
		let info: message::Group = match reader.decode().await {
			Ok(info) => info,
			Err(err) if err.is_fatal() => return Err(err),
			Err(err) => {
				reader.close(&err);
				return Ok(());
			}
		};

		let state = self.subscriptions.lock().get(&info.subscribe).cloned();
		let Some(state) = state else {
			return self.unknown(info.subscribe, &mut reader);
		};

		if !state.range.lock().contains(info.sequence) {
			tracing::debug!(?info, "out of range");
			reader.stop(GroupErrorCode::OutOfRange.into());
			return Ok(());
		}

		let group = GroupReader::new(info, reader);
		if let Err(group) = state.groups.push(info.sequence, group) {
			group.cancel(Error::ClosedTrack);
		}

		Ok(())
	}

	// Groups for an id we recently closed are expected; ids we never handed out are not.
	fn unknown(&self, id: u64, reader: &mut Reader) -> Result<(), Error> {
		if id < self.next_id.load(atomic::Ordering::Relaxed) {
			tracing::debug!(?id, "group for closed subscription");
			reader.stop(GroupErrorCode::Closed.into());
			return Ok(());
		}

		reader.stop(GroupErrorCode::Internal.into());
		Err(Error::ProtocolViolation("unknown subscribe id"))
	}

	pub fn recv_datagram(&self, mut payload: Bytes) -> Result<(), Error> {
		let info = match message::Group::decode(&mut payload) {
			Ok(info) => info,
			Err(err) => {
				tracing::debug!(?err, "invalid datagram");
				return Ok(());
			}
		};

		let state = self.subscriptions.lock().get(&info.subscribe).cloned();
		let Some(state) = state else {
			if info.subscribe < self.next_id.load(atomic::Ordering::Relaxed) {
				return Ok(());
			}

			return Err(Error::ProtocolViolation("unknown subscribe id"));
		};

		if !state.range.lock().contains(info.sequence) {
			return Ok(());
		}

		if state.datagrams.push(info.sequence, Datagram { info, payload }).is_err() {
			tracing::debug!(?info, "datagram for finished subscription");
		}

		Ok(())
	}

	pub async fn recv_goaway(&self, mut stream: Stream) -> Result<(), Error> {
		let goaway: message::GoAway = stream.reader.decode().await?;
		tracing::info!(uri = %goaway.uri, "goaway");

		self.goaway.send_replace(Some(goaway.uri));
		Ok(())
	}

	pub async fn goaway(&self) -> Option<String> {
		let mut goaway = self.goaway.subscribe();
		let uri = goaway.wait_for(Option::is_some).await.ok()?;
		uri.clone()
	}

	pub fn close(&self) {
		for (_, state) in self.subscriptions.lock().drain() {
			state.groups.close();
			state.datagrams.close();
		}
	}
}
