use std::collections::HashSet;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{oneshot, watch, Mutex};

use crate::coding::Encode;
use crate::message::{self, GroupOrder, StreamType, SubscribeConfig};
use crate::transport::Connection;
use crate::util::{spawn, Close, Lock};
use crate::{Error, GroupErrorCode, Path};

use super::{GroupWriter, Reader, Scheduler, Stream, Writer};

/// The publisher's handle to a subscription requested by the peer.
pub struct Subscribed {
	request: message::Subscribe,
	info: Option<message::Info>,

	current: watch::Receiver<SubscribeConfig>,
	writer: Arc<Mutex<Writer>>,

	conn: Arc<dyn Connection>,
	scheduler: Scheduler,

	// Active subscribe ids, so a duplicate can be rejected.
	active: Lock<HashSet<u64>>,

	// Dropping this stops the background reader.
	_control: oneshot::Sender<()>,
}

impl Subscribed {
	pub(super) fn start(
		request: message::Subscribe,
		stream: Stream,
		conn: Arc<dyn Connection>,
		scheduler: Scheduler,
		active: Lock<HashSet<u64>>,
	) -> Self {
		let config = SubscribeConfig {
			priority: request.priority,
			order: request.order,
			expires: request.expires,
			range: request.range,
			params: request.params.clone(),
		};

		let (current_tx, current_rx) = watch::channel(config);
		let (control_tx, control_rx) = oneshot::channel();

		let Stream { writer, reader } = stream;
		let writer = Arc::new(Mutex::new(writer));

		spawn(Self::run(request.id, reader, current_tx, writer.clone(), control_rx));

		Self {
			request,
			info: None,
			current: current_rx,
			writer,
			conn,
			scheduler,
			active,
			_control: control_tx,
		}
	}

	#[tracing::instrument("subscribed", skip_all, fields(?id))]
	async fn run(
		id: u64,
		mut reader: Reader,
		current: watch::Sender<SubscribeConfig>,
		writer: Arc<Mutex<Writer>>,
		mut control: oneshot::Receiver<()>,
	) {
		let res = tokio::select! {
			res = Self::run_updates(&mut reader, &current) => res,
			_ = &mut control => Ok(()),
		};

		if let Err(err) = res {
			tracing::warn!(?err, "subscribed error");
			reader.close(&err);
			writer.lock().await.close(&err);
		}
	}

	async fn run_updates(reader: &mut Reader, current: &watch::Sender<SubscribeConfig>) -> Result<(), Error> {
		while let Some(update) = reader.decode_maybe::<message::SubscribeUpdate>().await? {
			if !current.borrow().range.narrows_to(&update.range) {
				return Err(Error::InvalidRange);
			}

			current.send_replace(update);
		}

		Ok(())
	}

	pub fn id(&self) -> u64 {
		self.request.id
	}

	pub fn path(&self) -> &Path {
		&self.request.path
	}

	/// The original request, before any updates.
	pub fn request(&self) -> &message::Subscribe {
		&self.request
	}

	/// The current settings, including any updates.
	pub fn current(&self) -> SubscribeConfig {
		self.current.borrow().clone()
	}

	/// Wait for the subscriber to change the subscription, or None once it's gone.
	pub async fn updated(&mut self) -> Option<SubscribeConfig> {
		self.current.changed().await.ok()?;
		Some(self.current.borrow_and_update().clone())
	}

	/// Resolves when the subscriber closes the subscription.
	pub async fn closed(&self) {
		let mut current = self.current.clone();
		while current.changed().await.is_ok() {}
	}

	/// Reply with the track info, which must happen before any groups are sent.
	pub async fn accept(&mut self, info: message::Info) -> Result<(), Error> {
		if self.info.is_some() {
			return Err(Error::ProtocolViolation("duplicate info"));
		}

		self.writer.lock().await.encode(&info).await?;
		self.info = Some(info);

		Ok(())
	}

	fn order(&self) -> GroupOrder {
		match self.info.as_ref().map(|info| info.order) {
			Some(GroupOrder::Default) | None => self.current.borrow().order,
			Some(order) => order,
		}
	}

	/// Open a stream for a group, waiting behind any more urgent groups in the session.
	pub async fn open_group(&mut self, sequence: u64, priority: u8) -> Result<GroupWriter, Error> {
		if self.info.is_none() {
			return Err(Error::ProtocolViolation("group before info"));
		}

		if self.current.has_changed().is_err() {
			return Err(Error::Closed);
		}

		let mut writer = self.scheduler.open(priority, self.order(), sequence, self.request.id).await?;

		let info = message::Group {
			subscribe: self.request.id,
			sequence,
			priority,
		};

		writer.encode_silent(&StreamType::Group).await?;
		writer.encode(&info).await?;

		Ok(GroupWriter::new(info, writer))
	}

	/// Send a whole group in a datagram.
	pub fn send_datagram(&self, sequence: u64, priority: u8, payload: Bytes) -> Result<(), Error> {
		let info = message::Group {
			subscribe: self.request.id,
			sequence,
			priority,
		};

		let mut buf = BytesMut::new();
		info.encode(&mut buf);
		buf.put(payload);

		self.conn.send_datagram(buf.freeze())?;
		Ok(())
	}

	/// Tell the subscriber that a run of groups won't be delivered.
	pub async fn gap(&mut self, start: u64, count: u64, code: GroupErrorCode) -> Result<(), Error> {
		let gap = message::SubscribeGap {
			start,
			count,
			code: code.into(),
		};

		self.writer.lock().await.encode(&gap).await
	}

	/// Finish the subscription cleanly.
	pub async fn close(self) -> Result<(), Error> {
		let res = self.writer.lock().await.finish();
		res
	}

	pub async fn close_with_error(self, err: Error) {
		self.writer.lock().await.close(&err);
	}
}

impl Drop for Subscribed {
	fn drop(&mut self) {
		self.active.lock().remove(&self.request.id);
	}
}
