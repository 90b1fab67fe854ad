//! The capabilities the session needs from QUIC or WebTransport.
//!
//! Native adapters live in `moqt-native`; [memory] pairs two endpoints in-process.
use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;

/// An error from the underlying transport.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
	/// The peer reset its send side of the stream.
	#[error("stream reset: code={0}")]
	Reset(u32),

	/// The peer stopped reading from the stream.
	#[error("stream stopped: code={0}")]
	Stopped(u32),

	/// The connection was closed, by either side.
	#[error("connection closed: code={code} reason={reason}")]
	Closed { code: u32, reason: String },

	/// The connection failed without an application code.
	#[error("connection lost: {0}")]
	Lost(String),

	#[error("datagram error: {0}")]
	Datagram(String),
}

/// A QUIC connection, or a WebTransport session.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
	async fn open_bi(&self) -> Result<(Box<dyn SendStream>, Box<dyn RecvStream>), TransportError>;
	async fn open_uni(&self) -> Result<Box<dyn SendStream>, TransportError>;

	async fn accept_bi(&self) -> Result<(Box<dyn SendStream>, Box<dyn RecvStream>), TransportError>;
	async fn accept_uni(&self) -> Result<Box<dyn RecvStream>, TransportError>;

	fn send_datagram(&self, payload: Bytes) -> Result<(), TransportError>;
	async fn recv_datagram(&self) -> Result<Bytes, TransportError>;

	/// Close the connection, resetting every stream.
	fn close(&self, code: u32, reason: &str);

	/// Block until the connection is closed, returning the reason.
	async fn closed(&self) -> TransportError;
}

#[async_trait]
pub trait SendStream: Send + Sync {
	/// Write some of the buffer, returning the number of bytes written.
	async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError>;

	/// Higher values are sent first.
	fn set_priority(&mut self, priority: i32);

	/// Gracefully end the stream.
	fn finish(&mut self) -> Result<(), TransportError>;

	/// Abandon the stream with an error code (cancel-write).
	fn reset(&mut self, code: u32);

	async fn write_all(&mut self, mut buf: &[u8]) -> Result<(), TransportError> {
		while !buf.is_empty() {
			let size = self.write(buf).await?;
			buf = &buf[size..];
		}

		Ok(())
	}
}

#[async_trait]
pub trait RecvStream: Send {
	/// Read up to `max` bytes, or None when the stream has finished.
	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, TransportError>;

	/// Tell the peer we're not reading anymore (cancel-read).
	fn stop(&mut self, code: u32);
}
