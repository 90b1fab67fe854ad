use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::{oneshot, Notify};

use crate::message::{GroupOrder, StreamType};
use crate::transport::Connection;
use crate::util::Lock;
use crate::Error;

use super::Writer;

/// A group waiting for a stream, ordered by how urgently it should be opened.
#[derive(Clone, Copy, Debug)]
pub(super) struct Pending {
	pub priority: u8,
	pub order: GroupOrder,
	pub sequence: u64,
	pub subscribe: u64,
	pub arrival: u64,
}

impl Pending {
	// Lower keys are opened first.
	fn key(&self) -> (u8, i128, u64, u64) {
		let order = match self.order {
			GroupOrder::Ascending => self.sequence as i128,
			GroupOrder::Descending => -(self.sequence as i128),
			GroupOrder::Default => self.arrival as i128,
		};

		(self.priority, order, self.subscribe, self.arrival)
	}

	/// True if `self` must be opened before `other`.
	pub fn before(&self, other: &Self) -> bool {
		self.key() < other.key()
	}

	/// Maps to the transport, where higher values are sent first.
	pub fn stream_priority(&self) -> i32 {
		i32::from(u8::MAX - self.priority)
	}
}

struct Request {
	pending: Pending,
	reply: oneshot::Sender<Writer>,
}

impl Ord for Request {
	fn cmp(&self, other: &Self) -> Ordering {
		if self.pending.before(&other.pending) {
			Ordering::Less
		} else if other.pending.before(&self.pending) {
			Ordering::Greater
		} else {
			Ordering::Equal
		}
	}
}

impl PartialOrd for Request {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl PartialEq for Request {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for Request {}

#[derive(Default)]
struct State {
	heap: BinaryHeap<Reverse<Request>>,
	arrivals: u64,
	closed: bool,
}

/// Hands out outbound group streams in priority order.
///
/// Every publisher handle in the session shares one scheduler, and a single task opens the streams.
#[derive(Clone, Default)]
pub(super) struct Scheduler {
	state: Lock<State>,
	notify: Arc<Notify>,
}

impl Scheduler {
	/// Wait for a unidirectional stream, once every more urgent group has one.
	///
	/// `priority` is the group priority, not the track priority of the subscription.
	pub async fn open(&self, priority: u8, order: GroupOrder, sequence: u64, subscribe: u64) -> Result<Writer, Error> {
		let (tx, rx) = oneshot::channel();

		{
			let mut state = self.state.lock();
			if state.closed {
				return Err(Error::Closed);
			}

			let pending = Pending {
				priority,
				order,
				sequence,
				subscribe,
				arrival: state.arrivals,
			};

			state.arrivals += 1;
			state.heap.push(Reverse(Request { pending, reply: tx }));
		}

		self.notify.notify_waiters();

		rx.await.map_err(|_| Error::Closed)
	}

	async fn next(&self) -> Option<Request> {
		loop {
			let notified = self.notify.notified();

			{
				let mut state = self.state.lock();
				if state.closed {
					return None;
				}

				// Skip anybody who gave up waiting.
				while let Some(Reverse(request)) = state.heap.pop() {
					if !request.reply.is_closed() {
						return Some(request);
					}
				}
			}

			notified.await;
		}
	}

	pub async fn run(&self, conn: &dyn Connection) -> Result<(), Error> {
		while let Some(request) = self.next().await {
			let send = conn.open_uni().await?;

			let mut writer = Writer::new(send, StreamType::Group);
			writer.set_priority(request.pending.stream_priority());

			// It's fine if they're gone; the stream is reset on drop.
			let _ = request.reply.send(writer);
		}

		Ok(())
	}

	/// Fail everybody waiting, now and later.
	pub fn close(&self) {
		let mut state = self.state.lock();
		state.closed = true;
		state.heap.clear();
		drop(state);

		self.notify.notify_waiters();
	}
}
