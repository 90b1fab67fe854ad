use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::coding::Parameters;
use crate::message::Announce;
use crate::{Error, Path};

type Notifier = mpsc::UnboundedSender<Announce>;

#[derive(Default)]
struct NodeState {
	children: BTreeMap<Bytes, Arc<Node>>,

	// Announced paths that end with one more part below this node.
	announcements: BTreeMap<Bytes, Parameters>,

	// Prefix subscribers for exactly this node.
	subscribers: Vec<(u64, Notifier)>,

	// Set once unlinked from the parent; lookups that land here must start over.
	removed: bool,
}

impl NodeState {
	fn is_empty(&self) -> bool {
		self.children.is_empty() && self.announcements.is_empty() && self.subscribers.is_empty()
	}

	fn notify(&self, announce: &Announce) {
		for (_, notifier) in &self.subscribers {
			// The receiver unregisters itself on drop.
			let _ = notifier.send(announce.clone());
		}
	}

	// Every announcement at or below this node, relative to it.
	fn collect(&self, suffix: &Path, out: &mut VecDeque<Announce>) {
		for (name, params) in &self.announcements {
			out.push_back(Announce::Active {
				suffix: suffix.clone().push(name.clone()),
				params: params.clone(),
			});
		}

		for (name, child) in &self.children {
			child.read().collect(&suffix.clone().push(name.clone()), out);
		}
	}
}

#[derive(Default)]
struct Node {
	state: RwLock<NodeState>,

	// The number of announcements in this subtree.
	count: AtomicU64,
}

impl Node {
	fn read(&self) -> RwLockReadGuard<'_, NodeState> {
		self.state.read().unwrap_or_else(PoisonError::into_inner)
	}

	fn write(&self) -> RwLockWriteGuard<'_, NodeState> {
		self.state.write().unwrap_or_else(PoisonError::into_inner)
	}

	// Returns the node at `parts`, creating any that are missing.
	fn ensure(self: &Arc<Self>, parts: &[Bytes]) -> Arc<Node> {
		'retry: loop {
			let mut node = self.clone();

			for part in parts {
				let child = {
					let state = node.read();
					if state.removed {
						continue 'retry;
					}
					state.children.get(part).cloned()
				};

				node = match child {
					Some(child) => child,
					None => {
						let mut state = node.write();
						if state.removed {
							continue 'retry;
						}
						state.children.entry(part.clone()).or_default().clone()
					}
				};
			}

			return node;
		}
	}

	fn find(self: &Arc<Self>, parts: &[Bytes]) -> Option<Arc<Node>> {
		let mut node = self.clone();
		for part in parts {
			let child = node.read().children.get(part).cloned()?;
			node = child;
		}

		Some(node)
	}

	// Holds a read lock on every ancestor while the leaf's parent is modified.
	// Returns None if a node disappeared along the way; the caller retries.
	fn insert(&self, rest: &[Bytes], depth: usize, path: &Path, params: &Parameters) -> Option<Result<(), Error>> {
		let Some((part, rest)) = rest.split_first() else {
			let mut state = self.write();
			if state.removed {
				return None;
			}

			let name = path.parts()[depth].clone();
			if state.announcements.contains_key(&name) {
				return Some(Err(Error::DuplicateTrack));
			}

			state.announcements.insert(name, params.clone());
			self.count.fetch_add(1, Ordering::Relaxed);
			state.notify(&Self::active(path, depth, params));

			return Some(Ok(()));
		};

		let state = self.read();
		if state.removed {
			return None;
		}

		let child = state.children.get(part)?.clone();
		let res = child.insert(rest, depth + 1, path, params);

		if let Some(Ok(())) = res {
			self.count.fetch_add(1, Ordering::Relaxed);
			state.notify(&Self::active(path, depth, params));
		}

		res
	}

	fn remove(&self, rest: &[Bytes], depth: usize, path: &Path) -> Result<Parameters, Error> {
		let Some((part, rest)) = rest.split_first() else {
			let mut state = self.write();
			let params = state.announcements.remove(&path.parts()[depth]).ok_or(Error::NotFound)?;

			self.count.fetch_sub(1, Ordering::Relaxed);
			state.notify(&Self::ended(path, depth, &params));

			return Ok(params);
		};

		let state = self.read();
		let child = state.children.get(part).ok_or(Error::NotFound)?.clone();
		let params = child.remove(rest, depth + 1, path)?;

		self.count.fetch_sub(1, Ordering::Relaxed);
		state.notify(&Self::ended(path, depth, &params));

		Ok(params)
	}

	// Unlink empty nodes along `rest`, from the bottom up.
	fn prune(&self, rest: &[Bytes]) {
		let Some((part, rest)) = rest.split_first() else {
			return;
		};

		let child = match self.read().children.get(part) {
			Some(child) => child.clone(),
			None => return,
		};

		child.prune(rest);

		let mut state = self.write();
		let empty = match state.children.get(part) {
			Some(current) if Arc::ptr_eq(current, &child) => {
				let mut child = child.write();
				child.removed = child.is_empty();
				child.removed
			}
			_ => false,
		};

		if empty {
			state.children.remove(part);
		}
	}

	fn active(path: &Path, depth: usize, params: &Parameters) -> Announce {
		Announce::Active {
			suffix: Path::from_parts(path.parts()[depth..].to_vec()),
			params: params.clone(),
		}
	}

	fn ended(path: &Path, depth: usize, params: &Parameters) -> Announce {
		Announce::Ended {
			suffix: Path::from_parts(path.parts()[depth..].to_vec()),
			params: params.clone(),
		}
	}
}

/// A trie of announced track paths, shared by every session in the process.
#[derive(Clone, Default)]
pub struct AnnouncementTree {
	root: Arc<Node>,
	next_id: Arc<AtomicU64>,
}

impl AnnouncementTree {
	pub fn new() -> Self {
		Self::default()
	}

	/// Announce a track, notifying every subscriber whose prefix covers it.
	pub fn announce(&self, path: Path, params: Parameters) -> Result<(), Error> {
		let Some((_, parent)) = path.parts().split_last() else {
			return Err(Error::ProtocolViolation("empty track path"));
		};

		loop {
			self.root.ensure(parent);

			if let Some(res) = self.root.insert(parent, 0, &path, &params) {
				return res;
			}
		}
	}

	/// Remove an announced track, returning its parameters.
	pub fn unannounce(&self, path: &Path) -> Result<Parameters, Error> {
		let Some((_, parent)) = path.parts().split_last() else {
			return Err(Error::NotFound);
		};

		let params = self.root.remove(parent, 0, path)?;
		self.root.prune(parent);

		Ok(params)
	}

	/// Returns the parameters of an announced track.
	pub fn get(&self, path: &Path) -> Option<Parameters> {
		let (name, parent) = path.parts().split_last()?;
		let node = self.root.find(parent)?;
		let params = node.read().announcements.get(name).cloned();
		params
	}

	/// The number of announced tracks under `prefix`, excluding the prefix itself.
	pub fn count(&self, prefix: &Path) -> u64 {
		match self.root.find(prefix.parts()) {
			Some(node) => node.count.load(Ordering::Relaxed),
			None => 0,
		}
	}

	/// Watch every track under `prefix`.
	pub fn subscribe(&self, prefix: Path) -> AnnounceSubscriber {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = mpsc::unbounded_channel();

		loop {
			let node = self.root.ensure(prefix.parts());

			// Exclusive, so no insert below can slip between the snapshot and the registration.
			let mut state = node.write();
			if state.removed {
				continue;
			}

			state.subscribers.push((id, tx));

			let mut initial = VecDeque::with_capacity(node.count.load(Ordering::Relaxed) as usize);
			state.collect(&Path::new(), &mut initial);
			drop(state);

			return AnnounceSubscriber {
				root: self.root.clone(),
				node,
				prefix,
				id,
				initial,
				live: false,
				updates: rx,
			};
		}
	}
}

/// Announcements under a prefix, relative to that prefix.
pub struct AnnounceSubscriber {
	root: Arc<Node>,
	node: Arc<Node>,
	prefix: Path,
	id: u64,

	initial: VecDeque<Announce>,
	live: bool,
	updates: mpsc::UnboundedReceiver<Announce>,
}

impl AnnounceSubscriber {
	pub fn prefix(&self) -> &Path {
		&self.prefix
	}

	/// Returns the existing tracks as ACTIVE, then LIVE, then each change.
	pub async fn next(&mut self) -> Option<Announce> {
		if let Some(announce) = self.initial.pop_front() {
			return Some(announce);
		}

		if !self.live {
			self.live = true;
			return Some(Announce::Live {
				params: Parameters::new(),
			});
		}

		self.updates.recv().await
	}
}

impl Drop for AnnounceSubscriber {
	fn drop(&mut self) {
		self.node.write().subscribers.retain(|(id, _)| *id != self.id);
		self.root.prune(self.prefix.parts());
	}
}
