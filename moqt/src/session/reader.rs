use std::{fmt, io};

use bytes::{Buf, BytesMut};
use tokio::time::Instant;

use crate::coding::{Decode, DecodeError};
use crate::message::StreamType;
use crate::transport::RecvStream;
use crate::util::Close;
use crate::Error;

const CHUNK_SIZE: usize = 64 * 1024;

// Buffers a transport stream so messages can be decoded as they arrive.
pub(crate) struct Reader {
	stream: Box<dyn RecvStream>,
	buffer: BytesMut,
	kind: StreamType,
	deadline: Option<Instant>,
}

impl Reader {
	pub fn new(stream: Box<dyn RecvStream>, kind: StreamType) -> Self {
		Self {
			stream,
			buffer: Default::default(),
			kind,
			deadline: None,
		}
	}

	/// Categorize errors on this stream by a different type, once known.
	pub fn set_kind(&mut self, kind: StreamType) {
		self.kind = kind;
	}

	pub fn set_deadline(&mut self, deadline: Option<Instant>) {
		self.deadline = deadline;
	}

	// A separate function just to avoid an extra log line
	pub async fn decode<T: Decode + fmt::Debug>(&mut self) -> Result<T, Error> {
		let msg = self.decode_silent().await?;
		tracing::debug!(?msg, "decode");
		Ok(msg)
	}

	pub async fn decode_silent<T: Decode>(&mut self) -> Result<T, Error> {
		loop {
			let mut cursor = io::Cursor::new(&self.buffer);

			// Try to decode with the current buffer.
			match T::decode(&mut cursor) {
				Ok(msg) => {
					let size = cursor.position() as usize;
					self.buffer.advance(size);
					return Ok(msg);
				}
				Err(DecodeError::Short) => {}
				Err(err) => return Err(err.into()),
			};

			if !self.read_more().await? {
				// The stream ended in the middle of a message.
				return Err(DecodeError::Short.into());
			}
		}
	}

	// Decode optional messages at the end of a stream
	pub async fn decode_maybe<T: Decode + fmt::Debug>(&mut self) -> Result<Option<T>, Error> {
		if self.buffer.is_empty() && !self.read_more().await? {
			return Ok(None);
		}

		Ok(Some(self.decode().await?))
	}

	/// Wait until the stream is closed, ensuring there are no additional bytes
	pub async fn finished(&mut self) -> Result<(), Error> {
		if self.buffer.is_empty() && !self.read_more().await? {
			return Ok(());
		}

		Err(DecodeError::ExpectedEnd.into())
	}

	/// Cancel-read with the given code.
	pub fn stop(&mut self, code: u32) {
		self.stream.stop(code);
	}

	// Returns false at the end of the stream.
	async fn read_more(&mut self) -> Result<bool, Error> {
		let read = self.stream.read_chunk(CHUNK_SIZE);

		let chunk = match self.deadline {
			Some(deadline) => match tokio::time::timeout_at(deadline, read).await {
				Ok(res) => res,
				Err(_) => {
					let err = Error::Timeout;
					self.stream.stop(err.to_code(self.kind));
					return Err(err);
				}
			},
			None => read.await,
		};

		match chunk.map_err(|err| Error::from(err).remote())? {
			Some(chunk) => {
				self.buffer.extend_from_slice(&chunk);
				Ok(true)
			}
			None => Ok(false),
		}
	}
}

impl Close for Reader {
	fn close(&mut self, err: &Error) {
		self.stream.stop(err.to_code(self.kind));
	}
}
