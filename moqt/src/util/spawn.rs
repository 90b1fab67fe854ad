use std::future::Future;

use tracing::Instrument;

// Background tasks inherit the span of whoever spawned them.
pub(crate) fn spawn<F: Future<Output = ()> + Send + 'static>(f: F) {
	tokio::task::spawn(f.in_current_span());
}
