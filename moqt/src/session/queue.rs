use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::Notify;

use crate::message::GroupOrder;
use crate::util::Lock;

struct Entry<T> {
	order: GroupOrder,
	sequence: u64,
	arrival: u64,
	item: T,
}

impl<T> Ord for Entry<T> {
	// BinaryHeap pops the greatest entry, so "greater" means "delivered sooner".
	fn cmp(&self, other: &Self) -> Ordering {
		let fifo = other.arrival.cmp(&self.arrival);

		match self.order {
			GroupOrder::Default => fifo,
			GroupOrder::Ascending => other.sequence.cmp(&self.sequence).then(fifo),
			GroupOrder::Descending => self.sequence.cmp(&other.sequence).then(fifo),
		}
	}
}

impl<T> PartialOrd for Entry<T> {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl<T> PartialEq for Entry<T> {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl<T> Eq for Entry<T> {}

struct State<T> {
	heap: BinaryHeap<Entry<T>>,
	order: GroupOrder,
	arrivals: u64,

	// The oldest arrival is evicted to make room past this.
	capacity: Option<usize>,

	// No more pushes, but queued items can still be popped.
	finished: bool,
}

/// Inbound groups for a subscription, popped in the subscription's group order.
pub(super) struct GroupQueue<T> {
	state: Lock<State<T>>,
	notify: Arc<Notify>,
}

impl<T> Clone for GroupQueue<T> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
			notify: self.notify.clone(),
		}
	}
}

impl<T> GroupQueue<T> {
	pub fn new(order: GroupOrder) -> Self {
		Self::with_capacity(order, None)
	}

	/// A lossy queue that keeps at most `capacity` items, dropping the oldest.
	pub fn bounded(order: GroupOrder, capacity: usize) -> Self {
		Self::with_capacity(order, Some(capacity))
	}

	fn with_capacity(order: GroupOrder, capacity: Option<usize>) -> Self {
		Self {
			state: Lock::new(State {
				heap: BinaryHeap::new(),
				order,
				arrivals: 0,
				capacity,
				finished: false,
			}),
			notify: Default::default(),
		}
	}

	/// Returns the item back if the queue no longer accepts groups.
	pub fn push(&self, sequence: u64, item: T) -> Result<(), T> {
		let mut state = self.state.lock();
		if state.finished {
			return Err(item);
		}

		let entry = Entry {
			order: state.order,
			sequence,
			arrival: state.arrivals,
			item,
		};

		state.arrivals += 1;
		state.heap.push(entry);

		if let Some(capacity) = state.capacity {
			if state.heap.len() > capacity {
				let oldest = state.heap.iter().map(|entry| entry.arrival).min();
				state.heap.retain(|entry| Some(entry.arrival) != oldest);
			}
		}

		drop(state);

		self.notify.notify_waiters();
		Ok(())
	}

	/// Returns None once the queue is finished and drained.
	pub async fn pop(&self) -> Option<T> {
		loop {
			let notified = self.notify.notified();

			{
				let mut state = self.state.lock();
				if let Some(entry) = state.heap.pop() {
					return Some(entry.item);
				}

				if state.finished {
					return None;
				}
			}

			notified.await;
		}
	}

	/// Re-sorts anything already queued.
	pub fn set_order(&self, order: GroupOrder) {
		let mut state = self.state.lock();
		if state.order == order {
			return;
		}

		state.order = order;

		let heap = std::mem::take(&mut state.heap);
		state.heap = heap
			.into_iter()
			.map(|mut entry| {
				entry.order = order;
				entry
			})
			.collect();
	}

	pub fn len(&self) -> usize {
		self.state.lock().heap.len()
	}

	pub fn finish(&self) {
		self.state.lock().finished = true;
		self.notify.notify_waiters();
	}

	/// Finish and drop anything queued.
	pub fn close(&self) {
		let mut state = self.state.lock();
		state.finished = true;
		state.heap.clear();
		drop(state);

		self.notify.notify_waiters();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	use futures::FutureExt;

	fn drain(queue: &GroupQueue<u64>) -> Vec<u64> {
		let mut out = Vec::new();
		while let Some(Some(item)) = queue.pop().now_or_never() {
			out.push(item);
		}
		out
	}

	#[tokio::test]
	async fn ascending() {
		let queue = GroupQueue::new(GroupOrder::Ascending);
		for seq in [7, 5, 6] {
			queue.push(seq, seq).unwrap();
		}

		assert_eq!(queue.len(), 3);
		assert_eq!(drain(&queue), vec![5, 6, 7]);
	}

	#[tokio::test]
	async fn descending() {
		let queue = GroupQueue::new(GroupOrder::Descending);
		for seq in [7, 5, 6] {
			queue.push(seq, seq).unwrap();
		}

		assert_eq!(drain(&queue), vec![7, 6, 5]);
	}

	#[tokio::test]
	async fn arrival() {
		let queue = GroupQueue::new(GroupOrder::Default);
		for seq in [7, 5, 6] {
			queue.push(seq, seq).unwrap();
		}

		assert_eq!(drain(&queue), vec![7, 5, 6]);
	}

	#[tokio::test]
	async fn reorder() {
		let queue = GroupQueue::new(GroupOrder::Ascending);
		for seq in [1, 3, 2] {
			queue.push(seq, seq).unwrap();
		}

		queue.set_order(GroupOrder::Descending);
		assert_eq!(drain(&queue), vec![3, 2, 1]);
	}

	#[tokio::test]
	async fn finish() {
		let queue = GroupQueue::new(GroupOrder::Default);
		queue.push(1, 1).unwrap();
		queue.finish();

		assert_eq!(queue.push(2, 2), Err(2));
		assert_eq!(queue.pop().await, Some(1));
		assert_eq!(queue.pop().await, None);
	}

	#[tokio::test]
	async fn bounded() {
		let queue = GroupQueue::bounded(GroupOrder::Ascending, 2);
		for seq in [1, 3, 2] {
			queue.push(seq, seq).unwrap();
		}

		// The first arrival was evicted, even though it would have been delivered first.
		assert_eq!(queue.len(), 2);
		assert_eq!(drain(&queue), vec![2, 3]);
	}

	#[tokio::test]
	async fn wakeup() {
		let queue = GroupQueue::new(GroupOrder::Default);
		let consumer = queue.clone();

		let task = tokio::spawn(async move { consumer.pop().await });
		tokio::task::yield_now().await;

		queue.push(4, 4u64).unwrap();
		assert_eq!(task.await.unwrap(), Some(4));
	}
}
