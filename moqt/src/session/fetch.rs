use bytes::Bytes;
use tokio::sync::watch;

use crate::message;
use crate::util::{spawn, Close};
use crate::{Error, Path};

use super::{GroupReader, GroupWriter, Reader, Stream, Writer};

/// The requester's side of a fetch: the frames of a single group.
pub struct FetchReader {
	group: GroupReader,
	writer: Writer,
}

impl FetchReader {
	pub(super) fn new(group: GroupReader, writer: Writer) -> Self {
		Self { group, writer }
	}

	pub fn info(&self) -> &message::Group {
		&self.group.info
	}

	/// The offset of the next frame within the group, counting from the requested frame.
	pub fn frame_sequence(&self) -> u64 {
		self.group.frame_sequence()
	}

	pub async fn read_frame(&mut self) -> Result<Option<Bytes>, Error> {
		self.group.read_frame().await
	}

	pub async fn read_all(&mut self) -> Result<Vec<Bytes>, Error> {
		self.group.read_all().await
	}

	/// Change the priority of the rest of the transfer.
	pub async fn update(&mut self, priority: u8) -> Result<(), Error> {
		self.writer.encode(&message::FetchUpdate { priority }).await
	}

	/// Finish our side once we're done reading.
	pub fn close(mut self) -> Result<(), Error> {
		self.writer.finish()
	}

	pub fn cancel(mut self, err: Error) {
		self.writer.close(&err);
		self.group.cancel(err);
	}
}

/// A request from the peer for a group, starting at a frame offset.
pub struct FetchRequested {
	request: message::Fetch,
	writer: Writer,
	priority: watch::Receiver<u8>,
}

impl FetchRequested {
	pub(super) fn start(request: message::Fetch, stream: Stream) -> Self {
		let Stream { writer, reader } = stream;
		let (priority_tx, priority_rx) = watch::channel(request.priority);

		spawn(Self::run(reader, priority_tx));

		Self {
			request,
			writer,
			priority: priority_rx,
		}
	}

	async fn run(mut reader: Reader, priority: watch::Sender<u8>) {
		let res = async {
			while let Some(update) = reader.decode_maybe::<message::FetchUpdate>().await? {
				priority.send_replace(update.priority);
			}

			Ok::<_, Error>(())
		};

		let res = res.await;
		if let Err(err) = res {
			tracing::debug!(?err, "fetch update error");
			reader.close(&err);
		}
	}

	pub fn request(&self) -> &message::Fetch {
		&self.request
	}

	pub fn path(&self) -> &Path {
		&self.request.path
	}

	/// The requester's current priority.
	pub fn priority(&self) -> u8 {
		*self.priority.borrow()
	}

	/// Start the reply. The application writes frames from [message::Fetch::frame] onwards.
	pub async fn accept(mut self, priority: u8) -> Result<GroupWriter, Error> {
		let info = message::Group {
			subscribe: 0,
			sequence: self.request.group,
			priority,
		};

		self.writer.set_priority(i32::from(u8::MAX - self.priority()));
		self.writer.encode(&info).await?;

		let group = GroupWriter::new(info, self.writer)
			.with_priority(self.priority)
			.starting_at(self.request.frame);

		Ok(group)
	}

	/// Reject the request, usually with [Error::NoGroup] or [Error::InvalidOffset].
	pub fn reject(mut self, err: Error) {
		self.writer.close(&err);
	}
}
