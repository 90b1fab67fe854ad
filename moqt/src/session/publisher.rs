use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::coding::Decode;
use crate::message;
use crate::transport::Connection;
use crate::util::{Close, Lock, Queue};
use crate::{Error, Path};

use super::{AnnounceSender, FetchRequested, InfoRequested, Scheduler, Stream, Subscribed};

// Requests from the peer, queued until the application accepts them.
#[derive(Clone)]
pub(super) struct Publisher {
	conn: Arc<dyn Connection>,
	scheduler: Scheduler,

	// The cap we advertised, if any.
	max_subscribe_id: Option<u64>,

	interests: Lock<HashSet<Path>>,
	subscriptions: Lock<HashSet<u64>>,

	announces: Queue<AnnounceSender>,
	subscribes: Queue<Subscribed>,
	infos: Queue<InfoRequested>,
	fetches: Queue<FetchRequested>,
}

impl Publisher {
	pub fn new(conn: Arc<dyn Connection>, scheduler: Scheduler, max_subscribe_id: Option<u64>) -> Self {
		Self {
			conn,
			scheduler,
			max_subscribe_id,
			interests: Default::default(),
			subscriptions: Default::default(),
			announces: Default::default(),
			subscribes: Default::default(),
			infos: Default::default(),
			fetches: Default::default(),
		}
	}

	// Decode the request, closing just this stream on a bad message.
	async fn request<T: Decode + fmt::Debug>(stream: &mut Stream) -> Result<Option<T>, Error> {
		match stream.reader.decode().await {
			Ok(request) => Ok(Some(request)),
			Err(err) if err.is_fatal() => Err(err),
			Err(err) => {
				tracing::warn!(?err, "invalid request");
				stream.close(&err);
				Ok(None)
			}
		}
	}

	pub async fn recv_announce(&self, mut stream: Stream) -> Result<(), Error> {
		let Some(request) = Self::request::<message::AnnouncePlease>(&mut stream).await? else {
			return Ok(());
		};

		if !self.interests.lock().insert(request.prefix.clone()) {
			stream.close(&Error::DuplicateInterest);
			return Ok(());
		}

		let announce = AnnounceSender::new(request, stream, self.interests.clone());

		// Dropped (and reset) if the session is closing.
		let _ = self.announces.push(announce);
		Ok(())
	}

	pub async fn recv_subscribe(&self, mut stream: Stream) -> Result<(), Error> {
		let Some(request) = Self::request::<message::Subscribe>(&mut stream).await? else {
			return Ok(());
		};

		if let Some(max) = self.max_subscribe_id {
			if request.id >= max {
				stream.close(&Error::TooManySubscribes);
				return Err(Error::TooManySubscribes);
			}
		}

		if !request.range.is_valid() {
			stream.close(&Error::InvalidRange);
			return Ok(());
		}

		if !self.subscriptions.lock().insert(request.id) {
			stream.close(&Error::DuplicateId);
			return Ok(());
		}

		let subscribed = Subscribed::start(
			request,
			stream,
			self.conn.clone(),
			self.scheduler.clone(),
			self.subscriptions.clone(),
		);

		let _ = self.subscribes.push(subscribed);
		Ok(())
	}

	pub async fn recv_info(&self, mut stream: Stream) -> Result<(), Error> {
		let Some(request) = Self::request::<message::InfoRequest>(&mut stream).await? else {
			return Ok(());
		};

		let _ = self.infos.push(InfoRequested::new(request, stream));
		Ok(())
	}

	pub async fn recv_fetch(&self, mut stream: Stream) -> Result<(), Error> {
		let Some(request) = Self::request::<message::Fetch>(&mut stream).await? else {
			return Ok(());
		};

		let _ = self.fetches.push(FetchRequested::start(request, stream));
		Ok(())
	}

	pub async fn accept_announce(&self) -> Result<AnnounceSender, Error> {
		self.announces.pop().await.ok_or(Error::Closed)
	}

	pub async fn accept_subscribe(&self) -> Result<Subscribed, Error> {
		self.subscribes.pop().await.ok_or(Error::Closed)
	}

	pub async fn accept_info(&self) -> Result<InfoRequested, Error> {
		self.infos.pop().await.ok_or(Error::Closed)
	}

	pub async fn accept_fetch(&self) -> Result<FetchRequested, Error> {
		self.fetches.pop().await.ok_or(Error::Closed)
	}

	pub fn close(&self) {
		self.announces.close();
		self.subscribes.close();
		self.infos.close();
		self.fetches.close();
		self.scheduler.close();
	}
}
