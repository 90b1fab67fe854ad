use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Notify;

use super::Lock;

struct State<T> {
	items: VecDeque<T>,
	closed: bool,
}

// A multi-producer, multi-consumer FIFO that can be closed.
pub(crate) struct Queue<T> {
	state: Lock<State<T>>,
	notify: Arc<Notify>,
}

impl<T> Clone for Queue<T> {
	fn clone(&self) -> Self {
		Self {
			state: self.state.clone(),
			notify: self.notify.clone(),
		}
	}
}

impl<T> Default for Queue<T> {
	fn default() -> Self {
		Self {
			state: Lock::new(State {
				items: VecDeque::new(),
				closed: false,
			}),
			notify: Default::default(),
		}
	}
}

impl<T> Queue<T> {
	/// Returns the item back if the queue is closed.
	pub fn push(&self, item: T) -> Result<(), T> {
		let mut state = self.state.lock();
		if state.closed {
			return Err(item);
		}

		state.items.push_back(item);
		drop(state);

		self.notify.notify_waiters();
		Ok(())
	}

	/// Returns None once the queue is closed and drained.
	pub async fn pop(&self) -> Option<T> {
		loop {
			// Register before checking so a push in between isn't missed.
			let notified = self.notify.notified();

			{
				let mut state = self.state.lock();
				if let Some(item) = state.items.pop_front() {
					return Some(item);
				}

				if state.closed {
					return None;
				}
			}

			notified.await;
		}
	}

	/// Drops any queued items; they can't be served anymore.
	pub fn close(&self) {
		let mut state = self.state.lock();
		state.closed = true;
		state.items.clear();
		drop(state);

		self.notify.notify_waiters();
	}
}
