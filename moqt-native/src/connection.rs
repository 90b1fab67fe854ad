use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use moqt::transport::{self, TransportError};

/// A QUIC connection or WebTransport session, ready to be handed to [moqt::Session].
#[derive(Clone)]
pub struct Connection {
	session: web_transport_quinn::Session,
	url: Url,
}

impl Connection {
	pub fn new(session: web_transport_quinn::Session, url: Url) -> Self {
		Self { session, url }
	}

	/// The URL used to connect; for raw QUIC the path is always empty.
	pub fn url(&self) -> &Url {
		&self.url
	}
}

#[async_trait]
impl transport::Connection for Connection {
	async fn open_bi(&self) -> Result<(Box<dyn transport::SendStream>, Box<dyn transport::RecvStream>), TransportError> {
		let (send, recv) = self.session.open_bi().await.map_err(session_error)?;
		Ok((Box::new(SendStream(send)), Box::new(RecvStream(recv))))
	}

	async fn open_uni(&self) -> Result<Box<dyn transport::SendStream>, TransportError> {
		let send = self.session.open_uni().await.map_err(session_error)?;
		Ok(Box::new(SendStream(send)))
	}

	async fn accept_bi(
		&self,
	) -> Result<(Box<dyn transport::SendStream>, Box<dyn transport::RecvStream>), TransportError> {
		let (send, recv) = self.session.accept_bi().await.map_err(session_error)?;
		Ok((Box::new(SendStream(send)), Box::new(RecvStream(recv))))
	}

	async fn accept_uni(&self) -> Result<Box<dyn transport::RecvStream>, TransportError> {
		let recv = self.session.accept_uni().await.map_err(session_error)?;
		Ok(Box::new(RecvStream(recv)))
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), TransportError> {
		self.session
			.send_datagram(payload)
			.map_err(|err| TransportError::Datagram(err.to_string()))
	}

	async fn recv_datagram(&self) -> Result<Bytes, TransportError> {
		self.session.read_datagram().await.map_err(session_error)
	}

	fn close(&self, code: u32, reason: &str) {
		self.session.close(code, reason.as_bytes());
	}

	async fn closed(&self) -> TransportError {
		session_error(self.session.closed().await)
	}
}

struct SendStream(web_transport_quinn::SendStream);

#[async_trait]
impl transport::SendStream for SendStream {
	async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
		self.0.write(buf).await.map_err(write_error)
	}

	fn set_priority(&mut self, priority: i32) {
		// Fails only if the stream is already closed.
		let _ = self.0.set_priority(priority);
	}

	fn finish(&mut self) -> Result<(), TransportError> {
		self.0
			.finish()
			.map_err(|_| TransportError::Lost("stream already closed".to_string()))
	}

	fn reset(&mut self, code: u32) {
		let _ = self.0.reset(code);
	}
}

struct RecvStream(web_transport_quinn::RecvStream);

#[async_trait]
impl transport::RecvStream for RecvStream {
	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, TransportError> {
		let chunk = self.0.read_chunk(max, true).await.map_err(read_error)?;
		Ok(chunk.map(|chunk| chunk.bytes))
	}

	fn stop(&mut self, code: u32) {
		let _ = self.0.stop(code);
	}
}

fn session_error(err: web_transport_quinn::SessionError) -> TransportError {
	match err {
		web_transport_quinn::SessionError::ConnectionError(err) => connection_error(err),
		err => TransportError::Lost(err.to_string()),
	}
}

fn connection_error(err: quinn::ConnectionError) -> TransportError {
	match err {
		quinn::ConnectionError::ApplicationClosed(close) => TransportError::Closed {
			code: application_code(close.error_code.into_inner()),
			reason: String::from_utf8_lossy(&close.reason).to_string(),
		},
		err => TransportError::Lost(err.to_string()),
	}
}

// WebTransport codes are folded into the HTTP/3 error space on the wire.
fn application_code(code: u64) -> u32 {
	web_transport_proto::error_from_http3(code).unwrap_or_else(|| u32::try_from(code).unwrap_or(u32::MAX))
}

fn write_error(err: web_transport_quinn::WriteError) -> TransportError {
	match err {
		web_transport_quinn::WriteError::Stopped(code) => TransportError::Stopped(code),
		web_transport_quinn::WriteError::SessionError(err) => session_error(err),
		err => TransportError::Lost(err.to_string()),
	}
}

fn read_error(err: web_transport_quinn::ReadError) -> TransportError {
	match err {
		web_transport_quinn::ReadError::Reset(code) => TransportError::Reset(code),
		web_transport_quinn::ReadError::SessionError(err) => session_error(err),
		err => TransportError::Lost(err.to_string()),
	}
}
