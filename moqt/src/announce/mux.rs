use std::collections::{hash_map, HashMap};

use async_trait::async_trait;

use crate::coding::Parameters;
use crate::util::{spawn, Lock};
use crate::{AnnounceSender, Error, Path, Session, Subscribed};

use super::AnnouncementTree;

/// Serves subscriptions to a track registered with a [TrackMux].
#[async_trait]
pub trait TrackHandler: Send + Sync + 'static {
	async fn serve_track(&self, subscribed: Subscribed);
}

/// Routes inbound subscriptions to the handler registered for each track path.
///
/// A path is announced in the mux's tree for as long as it has a handler, so announce interests and subscriptions
/// are answered from the same registry.
pub struct TrackMux<H> {
	tree: AnnouncementTree,
	handlers: Lock<HashMap<Path, H>>,
}

impl<H> Default for TrackMux<H> {
	fn default() -> Self {
		Self {
			tree: AnnouncementTree::default(),
			handlers: Lock::new(HashMap::new()),
		}
	}
}

impl<H> Clone for TrackMux<H> {
	fn clone(&self) -> Self {
		Self {
			tree: self.tree.clone(),
			handlers: self.handlers.clone(),
		}
	}
}

impl<H: Clone> TrackMux<H> {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn tree(&self) -> &AnnouncementTree {
		&self.tree
	}

	/// Register a handler and announce its path.
	///
	/// Fails with [Error::DuplicateTrack] if the path already has a handler.
	pub fn handle(&self, path: Path, params: Parameters, handler: H) -> Result<(), Error> {
		let mut handlers = self.handlers.lock();
		let hash_map::Entry::Vacant(entry) = handlers.entry(path) else {
			return Err(Error::DuplicateTrack);
		};

		self.tree.announce(entry.key().clone(), params)?;
		entry.insert(handler);

		Ok(())
	}

	/// Swap the handler of a registered path without announcing it again, returning the previous one.
	pub fn replace(&self, path: &Path, handler: H) -> Option<H> {
		let mut handlers = self.handlers.lock();
		let current = handlers.get_mut(path)?;
		Some(std::mem::replace(current, handler))
	}

	/// Unregister a handler, ending the announcement of its path.
	pub fn remove(&self, path: &Path) -> Option<H> {
		let handler = self.handlers.lock().remove(path)?;

		if let Err(err) = self.tree.unannounce(path) {
			tracing::warn!(%path, ?err, "missing announcement");
		}

		Some(handler)
	}

	/// The handler registered for this exact path.
	pub fn handler(&self, path: &Path) -> Option<H> {
		self.handlers.lock().get(path).cloned()
	}

	/// Serve an announce interest from every registered path, until the subscriber goes away.
	pub async fn serve_announcements(&self, interest: AnnounceSender) -> Result<(), Error> {
		interest.serve(&self.tree).await
	}
}

impl<H: TrackHandler + Clone> TrackMux<H> {
	/// Hand a subscription to the handler for its path, or reject it with [Error::NotFound].
	pub async fn serve_track(&self, subscribed: Subscribed) {
		match self.handler(subscribed.path()) {
			Some(handler) => handler.serve_track(subscribed).await,
			None => {
				tracing::debug!(path = %subscribed.path(), "no handler");
				subscribed.close_with_error(Error::NotFound).await;
			}
		}
	}

	/// Answer every announce interest and subscription from the session until it closes.
	pub async fn serve(&self, session: &Session) -> Result<(), Error> {
		loop {
			tokio::select! {
				res = session.accept_announce() => {
					let interest = res?;
					let mux = self.clone();

					spawn(async move {
						if let Err(err) = mux.serve_announcements(interest).await {
							tracing::debug!(?err, "announce interest closed");
						}
					});
				}
				res = session.accept_subscribe() => {
					let subscribed = res?;
					let mux = self.clone();

					spawn(async move { mux.serve_track(subscribed).await });
				}
			}
		}
	}
}
