use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::message;
use crate::util::Close;
use crate::Error;

use super::{Reader, Writer};

/// An inbound group: a sequence of frames on its own stream.
pub struct GroupReader {
	pub info: message::Group,
	reader: Reader,
	frames: u64,
}

impl GroupReader {
	pub(super) fn new(info: message::Group, reader: Reader) -> Self {
		Self { info, reader, frames: 0 }
	}

	// Fetches resume part way through a group.
	pub(super) fn starting_at(mut self, frame: u64) -> Self {
		self.frames = frame;
		self
	}

	pub fn sequence(&self) -> u64 {
		self.info.sequence
	}

	pub fn priority(&self) -> u8 {
		self.info.priority
	}

	/// The index of the next frame to be read.
	pub fn frame_sequence(&self) -> u64 {
		self.frames
	}

	/// Returns the next frame, or None when the publisher finished the group.
	pub async fn read_frame(&mut self) -> Result<Option<Bytes>, Error> {
		match self.reader.decode_maybe::<message::Frame>().await? {
			Some(frame) => {
				self.frames += 1;
				Ok(Some(frame.payload))
			}
			None => Ok(None),
		}
	}

	/// Read every remaining frame.
	pub async fn read_all(&mut self) -> Result<Vec<Bytes>, Error> {
		let mut frames = Vec::new();
		while let Some(frame) = self.read_frame().await? {
			frames.push(frame);
		}

		Ok(frames)
	}

	/// Reads fail with [Error::Timeout] after the deadline, cancelling the group.
	pub fn set_deadline(&mut self, deadline: Option<Instant>) {
		self.reader.set_deadline(deadline);
	}

	/// Stop reading, telling the publisher why.
	pub fn cancel(mut self, err: Error) {
		self.reader.close(&err);
	}
}

/// An outbound group.
pub struct GroupWriter {
	pub info: message::Group,
	writer: Writer,
	frames: u64,

	// Fetch streams can be reprioritized by the requester.
	priority: Option<watch::Receiver<u8>>,
}

impl GroupWriter {
	pub(super) fn new(info: message::Group, writer: Writer) -> Self {
		Self {
			info,
			writer,
			frames: 0,
			priority: None,
		}
	}

	pub(super) fn with_priority(mut self, priority: watch::Receiver<u8>) -> Self {
		self.priority = Some(priority);
		self
	}

	pub(super) fn starting_at(mut self, frame: u64) -> Self {
		self.frames = frame;
		self
	}

	pub fn sequence(&self) -> u64 {
		self.info.sequence
	}

	pub fn frame_sequence(&self) -> u64 {
		self.frames
	}

	pub async fn write_frame(&mut self, payload: Bytes) -> Result<(), Error> {
		if let Some(priority) = &mut self.priority {
			if priority.has_changed().unwrap_or(false) {
				let priority = *priority.borrow_and_update();
				self.writer.set_priority(i32::from(u8::MAX - priority));
			}
		}

		self.writer.encode(&message::Frame { payload }).await?;
		self.frames += 1;

		Ok(())
	}

	/// Writes fail with [Error::Timeout] after the deadline, cancelling the group.
	pub fn set_deadline(&mut self, deadline: Option<Instant>) {
		self.writer.set_deadline(deadline);
	}

	/// Finish the group cleanly.
	pub fn close(mut self) -> Result<(), Error> {
		self.writer.finish()
	}

	pub fn cancel(mut self, err: Error) {
		self.writer.close(&err);
	}
}

/// A group delivered in a single datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Datagram {
	pub info: message::Group,
	pub payload: Bytes,
}
