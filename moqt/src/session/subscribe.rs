use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};

use crate::message::{self, GroupOrder, GroupRange, SubscribeConfig, SubscribeGap};
use crate::util::{spawn, Close, Lock};
use crate::{Error, Path};

use super::{Datagram, GroupQueue, GroupReader, Reader, Stream, Writer};

// Datagrams waiting for the application; older ones are dropped past this.
const MAX_DATAGRAMS: usize = 1024;

/// Routing state for an active subscription, shared with the session so inbound groups find their queue.
#[derive(Clone)]
pub(super) struct SubscribeState {
	pub range: Lock<GroupRange>,
	pub groups: GroupQueue<GroupReader>,
	pub datagrams: GroupQueue<Datagram>,

	// Why the subscription ended, if it failed.
	error: Lock<Option<Error>>,
}

impl SubscribeState {
	pub fn new(range: GroupRange, order: GroupOrder) -> Self {
		Self {
			range: Lock::new(range),
			groups: GroupQueue::new(order),
			datagrams: GroupQueue::bounded(order, MAX_DATAGRAMS),
			error: Default::default(),
		}
	}

	// Queued groups can still be read, but nothing new is accepted.
	fn finish(&self, err: Option<Error>) {
		*self.error.lock() = err;
		self.groups.finish();
		self.datagrams.finish();
	}

	fn error(&self) -> Error {
		self.error.lock().clone().unwrap_or(Error::Closed)
	}
}

/// The subscriber's handle to an active subscription.
pub struct Subscribe {
	request: message::Subscribe,
	info: message::Info,

	writer: Writer,
	state: SubscribeState,
	gaps: mpsc::UnboundedReceiver<SubscribeGap>,

	// Dropping this stops the background reader.
	control: Option<oneshot::Sender<Error>>,
}

impl Subscribe {
	pub(super) fn start(
		request: message::Subscribe,
		info: message::Info,
		stream: Stream,
		state: SubscribeState,
		subscriptions: Lock<HashMap<u64, SubscribeState>>,
	) -> Self {
		let (gaps_tx, gaps_rx) = mpsc::unbounded_channel();
		let (control_tx, control_rx) = oneshot::channel();

		let Stream { writer, reader } = stream;
		let id = request.id;

		let mut this = Self {
			request,
			info,
			writer,
			state: state.clone(),
			gaps: gaps_rx,
			control: Some(control_tx),
		};

		// The publisher decides the order when it has a preference.
		this.request.order = this.order();
		this.state.groups.set_order(this.request.order);
		this.state.datagrams.set_order(this.request.order);

		spawn(Self::run(id, reader, state, gaps_tx, control_rx, subscriptions));

		this
	}

	#[tracing::instrument("subscribe", skip_all, fields(?id))]
	async fn run(
		id: u64,
		mut reader: Reader,
		state: SubscribeState,
		gaps: mpsc::UnboundedSender<SubscribeGap>,
		mut control: oneshot::Receiver<Error>,
		subscriptions: Lock<HashMap<u64, SubscribeState>>,
	) {
		let res = tokio::select! {
			res = Self::run_gaps(&mut reader, &gaps) => res,
			err = &mut control => match err {
				Ok(err) => Err(err),
				Err(_) => Ok(()),
			},
		};

		if let Err(err) = &res {
			tracing::warn!(?err, "subscribe error");
			reader.close(err);
		} else {
			tracing::debug!("subscribe done");
		}

		// New groups with this id are rejected from now on.
		subscriptions.lock().remove(&id);
		state.finish(res.err());
	}

	async fn run_gaps(reader: &mut Reader, gaps: &mpsc::UnboundedSender<SubscribeGap>) -> Result<(), Error> {
		while let Some(gap) = reader.decode_maybe::<SubscribeGap>().await? {
			let _ = gaps.send(gap);
		}

		Ok(())
	}

	fn order(&self) -> GroupOrder {
		match self.info.order {
			GroupOrder::Default => self.request.order,
			order => order,
		}
	}

	pub fn id(&self) -> u64 {
		self.request.id
	}

	pub fn path(&self) -> &Path {
		&self.request.path
	}

	/// The publisher's reply to the subscription.
	pub fn info(&self) -> &message::Info {
		&self.info
	}

	/// The current settings, including any updates.
	pub fn config(&self) -> SubscribeConfig {
		SubscribeConfig {
			priority: self.request.priority,
			order: self.request.order,
			expires: self.request.expires,
			range: self.request.range,
			params: self.request.params.clone(),
		}
	}

	/// Change the subscription; the range may only shrink.
	pub async fn update(&mut self, config: SubscribeConfig) -> Result<(), Error> {
		if !self.request.range.narrows_to(&config.range) {
			return Err(Error::InvalidRange);
		}

		self.writer.encode(&config).await?;

		self.request.priority = config.priority;
		self.request.order = config.order;
		self.request.expires = config.expires;
		self.request.range = config.range;
		self.request.params = config.params;

		*self.state.range.lock() = config.range;
		self.state.groups.set_order(self.order());
		self.state.datagrams.set_order(self.order());

		Ok(())
	}

	/// The next group, in the subscription's group order.
	pub async fn accept_group(&self) -> Result<GroupReader, Error> {
		match self.state.groups.pop().await {
			Some(group) => Ok(group),
			None => Err(self.state.error()),
		}
	}

	pub async fn accept_datagram(&self) -> Result<Datagram, Error> {
		match self.state.datagrams.pop().await {
			Some(datagram) => Ok(datagram),
			None => Err(self.state.error()),
		}
	}

	/// Returns the next run of groups the publisher won't deliver.
	pub async fn next_gap(&mut self) -> Option<SubscribeGap> {
		self.gaps.recv().await
	}

	/// The number of groups waiting to be accepted.
	pub fn pending(&self) -> usize {
		self.state.groups.len()
	}

	/// Close the subscription cleanly.
	pub fn close(mut self) -> Result<(), Error> {
		self.writer.finish()
	}

	pub fn close_with_error(mut self, err: Error) {
		self.writer.close(&err);

		if let Some(control) = self.control.take() {
			let _ = control.send(err);
		}
	}
}
