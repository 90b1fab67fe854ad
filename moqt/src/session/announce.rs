use std::collections::{btree_map, BTreeMap, HashSet};
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot, watch};

use crate::announce::{AnnounceSubscriber, AnnouncementTree};
use crate::coding::Parameters;
use crate::message::{self, Announce};
use crate::transport::Connection;
use crate::util::{spawn, Close, Lock};
use crate::{Error, Path};

use super::{Reader, Stream};

// Messages kept for [AnnounceReceiver::next]; the oldest are dropped once a slow reader falls this far behind.
pub(super) const MAX_EVENTS: usize = 1024;

/// The publisher's side of an announce interest: tell the subscriber which tracks exist under a prefix.
pub struct AnnounceSender {
	request: message::AnnouncePlease,
	stream: Stream,

	active: HashSet<Path>,
	live: bool,

	// Unregistered on drop so the prefix can be requested again.
	interests: Lock<HashSet<Path>>,
}

impl AnnounceSender {
	pub(super) fn new(request: message::AnnouncePlease, stream: Stream, interests: Lock<HashSet<Path>>) -> Self {
		Self {
			request,
			stream,
			active: HashSet::new(),
			live: false,
			interests,
		}
	}

	pub fn prefix(&self) -> &Path {
		&self.request.prefix
	}

	pub fn params(&self) -> &Parameters {
		&self.request.params
	}

	/// Announce a track, relative to the prefix.
	pub async fn active(&mut self, suffix: Path, params: Parameters) -> Result<(), Error> {
		if self.active.contains(&suffix) {
			return Err(Error::ProtocolViolation("duplicate active announce"));
		}

		self.stream
			.writer
			.encode(&Announce::Active {
				suffix: suffix.clone(),
				params,
			})
			.await?;

		self.active.insert(suffix);
		Ok(())
	}

	/// Withdraw a track previously announced with [Self::active].
	pub async fn ended(&mut self, suffix: Path, params: Parameters) -> Result<(), Error> {
		if !self.active.remove(&suffix) {
			return Err(Error::ProtocolViolation("ended without active"));
		}

		self.stream.writer.encode(&Announce::Ended { suffix, params }).await
	}

	/// Signal that the initial set of announcements has been sent.
	pub async fn live(&mut self, params: Parameters) -> Result<(), Error> {
		if self.live {
			return Err(Error::ProtocolViolation("duplicate live"));
		}

		self.live = true;
		self.stream.writer.encode(&Announce::Live { params }).await
	}

	/// Serve every track in the tree under our prefix until the subscriber goes away.
	#[tracing::instrument("announce", skip_all, fields(prefix = %self.request.prefix))]
	pub async fn serve(mut self, tree: &AnnouncementTree) -> Result<(), Error> {
		let mut announced = tree.subscribe(self.request.prefix.clone());

		let res = self.run_serve(&mut announced).await;
		match res {
			Ok(()) => self.close(),
			Err(err) => {
				tracing::warn!(?err, "announce error");
				self.stream.close(&err);
				Err(err)
			}
		}
	}

	async fn run_serve(&mut self, announced: &mut AnnounceSubscriber) -> Result<(), Error> {
		loop {
			tokio::select! {
				res = self.stream.reader.finished() => return res,
				Some(announce) = announced.next() => match announce {
					Announce::Active { suffix, params } => self.active(suffix, params).await?,
					Announce::Ended { suffix, params } => self.ended(suffix, params).await?,
					Announce::Live { params } => self.live(params).await?,
				},
			}
		}
	}

	/// Resolves when the subscriber closes its side.
	pub async fn closed(&mut self) -> Result<(), Error> {
		self.stream.reader.finished().await
	}

	pub fn close(mut self) -> Result<(), Error> {
		self.stream.writer.finish()
	}

	pub fn close_with_error(mut self, err: Error) {
		self.stream.close(&err);
	}
}

impl Drop for AnnounceSender {
	fn drop(&mut self) {
		self.interests.lock().remove(&self.request.prefix);
	}
}

#[derive(Default)]
struct AnnouncedState {
	active: BTreeMap<Path, Parameters>,
	live: bool,

	// Some once the stream is done, with the error if it failed.
	closed: Option<Result<(), Error>>,
}

/// The subscriber's side of an announce interest: the tracks currently announced under a prefix.
pub struct AnnounceReceiver {
	prefix: Path,
	state: watch::Receiver<AnnouncedState>,
	events: broadcast::Receiver<Announce>,

	// Dropping this closes the stream cleanly.
	control: Option<oneshot::Sender<Error>>,
}

impl AnnounceReceiver {
	pub(super) fn start(conn: Arc<dyn Connection>, prefix: Path, stream: Stream) -> Self {
		let (state_tx, state_rx) = watch::channel(AnnouncedState::default());
		let (events_tx, events_rx) = broadcast::channel(MAX_EVENTS);
		let (control_tx, control_rx) = oneshot::channel();

		spawn(Self::run(conn, prefix.clone(), stream, state_tx, events_tx, control_rx));

		Self {
			prefix,
			state: state_rx,
			events: events_rx,
			control: Some(control_tx),
		}
	}

	#[tracing::instrument("announced", skip_all, fields(%prefix))]
	async fn run(
		conn: Arc<dyn Connection>,
		prefix: Path,
		mut stream: Stream,
		state: watch::Sender<AnnouncedState>,
		events: broadcast::Sender<Announce>,
		mut control: oneshot::Receiver<Error>,
	) {
		let res = tokio::select! {
			res = Self::run_recv(&mut stream.reader, &state, &events) => res,
			err = &mut control => match err {
				Ok(err) => Err(err),
				Err(_) => Ok(()),
			},
		};

		let res = match res {
			Ok(()) => stream.writer.finish(),
			Err(err) => Err(err),
		};

		if let Err(err) = &res {
			tracing::warn!(?err, "announce error");
			stream.close(err);

			// A misbehaving publisher takes the whole session down with it.
			if err.is_fatal() {
				conn.close(err.session_code().into(), &err.to_string());
			}
		}

		state.send_modify(|state| state.closed = Some(res));
	}

	async fn run_recv(
		reader: &mut Reader,
		state: &watch::Sender<AnnouncedState>,
		events: &broadcast::Sender<Announce>,
	) -> Result<(), Error> {
		while let Some(announce) = reader.decode_maybe::<Announce>().await? {
			let mut res = Ok(());

			state.send_if_modified(|state| {
				res = Self::apply(state, &announce);
				res.is_ok()
			});

			res?;

			// It's fine if nobody is reading the events.
			let _ = events.send(announce);
		}

		Ok(())
	}

	fn apply(state: &mut AnnouncedState, announce: &Announce) -> Result<(), Error> {
		match announce {
			Announce::Active { suffix, params } => match state.active.entry(suffix.clone()) {
				btree_map::Entry::Vacant(entry) => {
					tracing::debug!(%suffix, "announced");
					entry.insert(params.clone());
				}
				btree_map::Entry::Occupied(_) => return Err(Error::ProtocolViolation("duplicate active announce")),
			},
			Announce::Ended { suffix, .. } => {
				tracing::debug!(%suffix, "unannounced");
				state
					.active
					.remove(suffix)
					.ok_or(Error::ProtocolViolation("ended without active"))?;
			}
			Announce::Live { .. } if state.live => return Err(Error::ProtocolViolation("duplicate live")),
			Announce::Live { .. } => state.live = true,
		}

		Ok(())
	}

	pub fn prefix(&self) -> &Path {
		&self.prefix
	}

	/// The suffixes currently announced.
	///
	/// Fails once the stream has been closed with an error, rather than returning stale data.
	pub fn announced(&self) -> Result<Vec<Path>, Error> {
		let state = self.state.borrow();
		if let Some(Err(err)) = &state.closed {
			return Err(err.clone());
		}

		Ok(state.active.keys().cloned().collect())
	}

	/// Wait until the publisher has sent its initial set of announcements.
	pub async fn live(&mut self) -> Result<(), Error> {
		let state = self
			.state
			.wait_for(|state| state.live || state.closed.is_some())
			.await
			.map_err(|_| Error::Closed)?;

		match &state.closed {
			Some(Err(err)) => Err(err.clone()),
			_ if state.live => Ok(()),
			_ => Err(Error::Closed),
		}
	}

	/// Wait for LIVE, then return every announced suffix.
	pub async fn receive_announcements(&mut self) -> Result<Vec<Path>, Error> {
		self.live().await?;
		self.announced()
	}

	/// Returns each ACTIVE/ENDED/LIVE message in arrival order, or None when the stream finishes.
	///
	/// Only the most recent messages are kept; a reader that falls behind skips the oldest.
	/// [Self::announced] is always complete.
	pub async fn next(&mut self) -> Result<Option<Announce>, Error> {
		loop {
			match self.events.recv().await {
				Ok(announce) => return Ok(Some(announce)),
				Err(broadcast::error::RecvError::Lagged(skipped)) => {
					tracing::debug!(skipped, "dropped announce events");
				}
				Err(broadcast::error::RecvError::Closed) => break,
			}
		}

		match &self.state.borrow().closed {
			Some(Err(err)) => Err(err.clone()),
			_ => Ok(None),
		}
	}

	/// Close the stream cleanly.
	pub fn close(self) {}

	pub fn close_with_error(mut self, err: Error) {
		if let Some(control) = self.control.take() {
			let _ = control.send(err);
		}
	}
}

impl Drop for AnnounceReceiver {
	fn drop(&mut self) {
		// Dropping the sender wakes the task, which finishes the stream.
		self.control.take();
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn transitions() {
		let mut state = AnnouncedState::default();
		let alice = Path::from(["alice"]);

		let active = Announce::Active {
			suffix: alice.clone(),
			params: Parameters::new(),
		};
		let ended = Announce::Ended {
			suffix: alice.clone(),
			params: Parameters::new(),
		};
		let live = Announce::Live {
			params: Parameters::new(),
		};

		AnnounceReceiver::apply(&mut state, &active).unwrap();
		assert!(AnnounceReceiver::apply(&mut state, &active).is_err());

		AnnounceReceiver::apply(&mut state, &live).unwrap();
		assert!(AnnounceReceiver::apply(&mut state, &live).is_err());

		AnnounceReceiver::apply(&mut state, &ended).unwrap();
		assert!(AnnounceReceiver::apply(&mut state, &ended).is_err());
		assert!(state.active.is_empty());
	}
}
