use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared state behind a synchronous mutex.
///
/// Never hold the guard across an await point.
pub struct Lock<T> {
	inner: Arc<Mutex<T>>,
}

impl<T> Lock<T> {
	pub fn new(value: T) -> Self {
		Self {
			inner: Arc::new(Mutex::new(value)),
		}
	}

	/// A poisoned lock still yields the data; a panicking task can't leave our maps half-updated.
	pub fn lock(&self) -> MutexGuard<'_, T> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}
}

impl<T: Default> Default for Lock<T> {
	fn default() -> Self {
		Self::new(T::default())
	}
}

impl<T> Clone for Lock<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: fmt::Debug> fmt::Debug for Lock<T> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("Lock").field(&*self.lock()).finish()
	}
}
