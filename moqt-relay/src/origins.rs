use std::collections::HashMap;

use moqt::message::Announce;
use moqt::{
	AnnounceReceiver, AnnounceSender, AnnouncementTree, Error, Lock, Parameters, Path, Session, Subscribed,
	TrackHandler, TrackMux,
};

use crate::connection::forward_subscribe;

#[derive(Clone)]
struct Route {
	id: u64,
	session: Session,
}

#[async_trait::async_trait]
impl TrackHandler for Route {
	async fn serve_track(&self, subscribed: Subscribed) {
		forward_subscribe(self.session.clone(), subscribed).await
	}
}

/// Tracks which peer publishes each path, so requests can be forwarded to it.
#[derive(Clone, Default)]
pub struct Origins {
	// The current origin of each path, announced to every interest.
	mux: TrackMux<Route>,

	// Every session announcing each path, most recent last.
	routes: Lock<HashMap<Path, Vec<Route>>>,
}

impl Origins {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn tree(&self) -> &AnnouncementTree {
		self.mux.tree()
	}

	/// Learn every path announced by the peer until it stops announcing.
	///
	/// Any routes through the peer are removed on return.
	pub async fn publish(&self, id: u64, session: Session) -> Result<(), Error> {
		let res = match session.announced(Path::new(), Parameters::new()).await {
			Ok(mut announced) => self.run_publish(id, &session, &mut announced).await,
			Err(err) => Err(err),
		};

		self.unpublish(id);
		res
	}

	async fn run_publish(&self, id: u64, session: &Session, announced: &mut AnnounceReceiver) -> Result<(), Error> {
		while let Some(announce) = announced.next().await? {
			match announce {
				Announce::Active { suffix, params } => self.add(id, session, suffix, params),
				Announce::Ended { suffix, .. } => self.remove(id, &suffix),
				Announce::Live { .. } => tracing::debug!(id, "origin live"),
			}
		}

		Ok(())
	}

	fn add(&self, id: u64, session: &Session, path: Path, params: Parameters) {
		let route = Route {
			id,
			session: session.clone(),
		};

		let mut routes = self.routes.lock();
		if let Some(list) = routes.get_mut(&path) {
			// The newest origin serves, the rest are kept as backups.
			tracing::debug!(id, %path, "backup origin");
			self.mux.replace(&path, route.clone());
			list.push(route);
			return;
		}

		// The first origin makes the path visible to everybody else.
		if let Err(err) = self.mux.handle(path.clone(), params, route.clone()) {
			tracing::warn!(id, %path, ?err, "invalid announce");
			return;
		}

		tracing::info!(id, %path, "origin");
		routes.insert(path, vec![route]);
	}

	fn remove(&self, id: u64, path: &Path) {
		let mut routes = self.routes.lock();
		let Some(list) = routes.get_mut(path) else {
			return;
		};

		list.retain(|route| route.id != id);
		match list.last() {
			Some(next) => {
				self.mux.replace(path, next.clone());
			}
			None => {
				routes.remove(path);
				self.mux.remove(path);
				tracing::info!(id, %path, "unannounced");
			}
		}
	}

	fn unpublish(&self, id: u64) {
		let mut routes = self.routes.lock();
		routes.retain(|path, list| {
			list.retain(|route| route.id != id);

			match list.last() {
				Some(next) => {
					self.mux.replace(path, next.clone());
					true
				}
				None => {
					self.mux.remove(path);
					false
				}
			}
		});
	}

	/// The most recent session announcing this exact path.
	pub fn route(&self, path: &Path) -> Option<Session> {
		self.mux.handler(path).map(|route| route.session)
	}

	/// Forward a subscription to the current origin of its path.
	pub async fn serve_track(&self, subscribed: Subscribed) {
		self.mux.serve_track(subscribed).await
	}

	/// Serve an announce interest from every path any origin has announced.
	pub async fn serve_announcements(&self, interest: AnnounceSender) -> Result<(), Error> {
		self.mux.serve_announcements(interest).await
	}
}

#[cfg(test)]
mod test {
	use std::time::Duration;

	use moqt::transport::memory::MemoryConnection;
	use moqt::SessionConfig;

	use super::*;

	async fn pair() -> (Session, Session) {
		let (a, b) = MemoryConnection::pair();
		let (client, server) = tokio::join!(
			Session::connect(a, SessionConfig::default()),
			Session::accept(b, SessionConfig::default())
		);
		(client.unwrap(), server.unwrap())
	}

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(10)).await;
	}

	impl Origins {
		// The id of the session currently serving the path.
		fn serving(&self, path: &Path) -> Option<u64> {
			self.mux.handler(path).map(|route| route.id)
		}
	}

	#[tokio::test]
	async fn routes() {
		tokio::time::pause();

		let origins = Origins::new();
		let (a, relay_a) = pair().await;
		let (b, relay_b) = pair().await;

		tokio::spawn({
			let origins = origins.clone();
			async move { origins.publish(0, relay_a).await }
		});
		let publish_b = tokio::spawn({
			let origins = origins.clone();
			async move { origins.publish(1, relay_b).await }
		});

		let mut announce_a = a.accept_announce().await.unwrap();
		let mut announce_b = b.accept_announce().await.unwrap();

		let path = Path::from("room/alice");
		announce_a.active(path.clone(), Parameters::new()).await.unwrap();
		settle().await;

		assert_eq!(origins.serving(&path), Some(0));
		assert!(origins.tree().get(&path).is_some());
		assert!(origins.route(&Path::from("room")).is_none());

		// The newest origin serves, with the first kept as a backup.
		announce_b.active(path.clone(), Parameters::new()).await.unwrap();
		settle().await;
		assert_eq!(origins.serving(&path), Some(1));

		announce_b.ended(path.clone(), Parameters::new()).await.unwrap();
		settle().await;
		assert_eq!(origins.serving(&path), Some(0));
		assert!(origins.tree().get(&path).is_some());

		announce_b.active(path.clone(), Parameters::new()).await.unwrap();
		announce_a.ended(path.clone(), Parameters::new()).await.unwrap();
		settle().await;

		assert_eq!(origins.serving(&path), Some(1));
		assert!(origins.tree().get(&path).is_some());

		// Finishing the last origin's stream removes the path.
		announce_b.close().unwrap();
		settle().await;

		assert!(publish_b.await.unwrap().is_ok());
		assert!(origins.route(&path).is_none());
		assert!(origins.tree().get(&path).is_none());
	}

	#[tokio::test]
	async fn session_closed() {
		tokio::time::pause();

		let origins = Origins::new();
		let (a, relay_a) = pair().await;

		let publish = tokio::spawn({
			let origins = origins.clone();
			async move { origins.publish(7, relay_a).await }
		});

		let mut announce = a.accept_announce().await.unwrap();
		announce.active(Path::from("a/b"), Parameters::new()).await.unwrap();
		announce.active(Path::from("a/c"), Parameters::new()).await.unwrap();
		settle().await;

		assert_eq!(origins.tree().count(&Path::from("a")), 2);

		a.terminate(Error::Cancel);
		drop(announce);

		assert!(publish.await.unwrap().is_err());
		assert_eq!(origins.tree().count(&Path::from("a")), 0);
	}
}
