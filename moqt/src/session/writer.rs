use std::fmt;

use bytes::BytesMut;
use tokio::time::Instant;

use crate::coding::Encode;
use crate::message::StreamType;
use crate::transport::SendStream;
use crate::util::Close;
use crate::Error;

// A wrapper around a SendStream that will reset on Drop
pub(crate) struct Writer {
	stream: Box<dyn SendStream>,
	buffer: BytesMut,
	kind: StreamType,
	deadline: Option<Instant>,
	done: bool,
}

impl Writer {
	pub fn new(stream: Box<dyn SendStream>, kind: StreamType) -> Self {
		Self {
			stream,
			buffer: Default::default(),
			kind,
			deadline: None,
			done: false,
		}
	}

	pub fn set_kind(&mut self, kind: StreamType) {
		self.kind = kind;
	}

	pub fn set_deadline(&mut self, deadline: Option<Instant>) {
		self.deadline = deadline;
	}

	pub async fn encode<T: Encode + fmt::Debug>(&mut self, msg: &T) -> Result<(), Error> {
		tracing::debug!(?msg, "encode");
		self.encode_silent(msg).await
	}

	pub async fn encode_silent<T: Encode>(&mut self, msg: &T) -> Result<(), Error> {
		self.buffer.clear();
		msg.encode(&mut self.buffer);

		let buffer = std::mem::take(&mut self.buffer);
		let res = self.write(&buffer).await;
		self.buffer = buffer;

		res
	}

	pub async fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
		let write = self.stream.write_all(buf);

		let res = match self.deadline {
			Some(deadline) => match tokio::time::timeout_at(deadline, write).await {
				Ok(res) => res,
				Err(_) => {
					let err = Error::Timeout;
					self.reset(err.to_code(self.kind));
					return Err(err);
				}
			},
			None => write.await,
		};

		res.map_err(|err| Error::from(err).remote())
	}

	/// Higher values are sent first.
	pub fn set_priority(&mut self, priority: i32) {
		self.stream.set_priority(priority);
	}

	/// A clean termination of the stream.
	pub fn finish(&mut self) -> Result<(), Error> {
		self.done = true;
		self.stream.finish()?;
		Ok(())
	}

	/// Cancel-write with the given code.
	pub fn reset(&mut self, code: u32) {
		if !self.done {
			self.done = true;
			self.stream.reset(code);
		}
	}
}

impl Close for Writer {
	fn close(&mut self, err: &Error) {
		self.reset(err.to_code(self.kind));
	}
}

impl Drop for Writer {
	fn drop(&mut self) {
		// Unlike the QUIC default, we abort the stream on drop.
		self.reset(Error::Cancel.to_code(self.kind));
	}
}
