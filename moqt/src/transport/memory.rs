//! An in-process [Connection] pair, used by tests and local loopback.
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, watch};

use super::{Connection, RecvStream, SendStream, TransportError};

type BiStream = (Box<dyn SendStream>, Box<dyn RecvStream>);
type Closed = Arc<watch::Sender<Option<TransportError>>>;

/// One side of an in-memory connection.
pub struct MemoryConnection {
	closed: Closed,

	peer_bi: mpsc::UnboundedSender<BiStream>,
	peer_uni: mpsc::UnboundedSender<Box<dyn RecvStream>>,
	peer_datagram: mpsc::UnboundedSender<Bytes>,

	bi: tokio::sync::Mutex<mpsc::UnboundedReceiver<BiStream>>,
	uni: tokio::sync::Mutex<mpsc::UnboundedReceiver<Box<dyn RecvStream>>>,
	datagram: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl MemoryConnection {
	/// Returns two connected endpoints.
	pub fn pair() -> (Self, Self) {
		let (closed, _) = watch::channel(None);
		let closed = Arc::new(closed);

		let (a_bi_tx, a_bi_rx) = mpsc::unbounded_channel();
		let (a_uni_tx, a_uni_rx) = mpsc::unbounded_channel();
		let (a_dg_tx, a_dg_rx) = mpsc::unbounded_channel();

		let (b_bi_tx, b_bi_rx) = mpsc::unbounded_channel();
		let (b_uni_tx, b_uni_rx) = mpsc::unbounded_channel();
		let (b_dg_tx, b_dg_rx) = mpsc::unbounded_channel();

		let a = Self {
			closed: closed.clone(),
			peer_bi: b_bi_tx,
			peer_uni: b_uni_tx,
			peer_datagram: b_dg_tx,
			bi: a_bi_rx.into(),
			uni: a_uni_rx.into(),
			datagram: a_dg_rx.into(),
		};

		let b = Self {
			closed,
			peer_bi: a_bi_tx,
			peer_uni: a_uni_tx,
			peer_datagram: a_dg_tx,
			bi: b_bi_rx.into(),
			uni: b_uni_rx.into(),
			datagram: b_dg_rx.into(),
		};

		(a, b)
	}

	fn check(&self) -> Result<(), TransportError> {
		match &*self.closed.borrow() {
			Some(err) => Err(err.clone()),
			None => Ok(()),
		}
	}

	fn pipe(&self) -> (MemorySend, MemoryRecv) {
		let (tx, rx) = mpsc::unbounded_channel();
		let stopped = Arc::new(Mutex::new(None));

		let send = MemorySend {
			chunks: Some(tx),
			stopped: stopped.clone(),
			closed: self.closed.subscribe(),
			priority: 0,
		};

		let recv = MemoryRecv {
			chunks: rx,
			pending: Bytes::new(),
			done: false,
			stopped,
			closed: self.closed.subscribe(),
		};

		(send, recv)
	}
}

async fn wait_closed(closed: &mut watch::Receiver<Option<TransportError>>) -> TransportError {
	match closed.wait_for(Option::is_some).await {
		Ok(err) => {
			let err: Option<TransportError> = (*err).clone();
			err.unwrap_or_else(|| TransportError::Lost("closed".to_string()))
		}
		Err(_) => TransportError::Lost("dropped".to_string()),
	}
}

async fn accept<T>(
	queue: &tokio::sync::Mutex<mpsc::UnboundedReceiver<T>>,
	closed: &Closed,
) -> Result<T, TransportError> {
	let mut closed = closed.subscribe();
	let mut queue = queue.lock().await;

	tokio::select! {
		biased;
		err = wait_closed(&mut closed) => Err(err),
		res = queue.recv() => res.ok_or_else(|| TransportError::Lost("peer dropped".to_string())),
	}
}

#[async_trait]
impl Connection for MemoryConnection {
	async fn open_bi(&self) -> Result<BiStream, TransportError> {
		self.check()?;

		let (local_send, remote_recv) = self.pipe();
		let (remote_send, local_recv) = self.pipe();

		self.peer_bi
			.send((Box::new(remote_send), Box::new(remote_recv)))
			.map_err(|_| TransportError::Lost("peer dropped".to_string()))?;

		Ok((Box::new(local_send), Box::new(local_recv)))
	}

	async fn open_uni(&self) -> Result<Box<dyn SendStream>, TransportError> {
		self.check()?;

		let (send, recv) = self.pipe();
		self.peer_uni
			.send(Box::new(recv))
			.map_err(|_| TransportError::Lost("peer dropped".to_string()))?;

		Ok(Box::new(send))
	}

	async fn accept_bi(&self) -> Result<BiStream, TransportError> {
		accept(&self.bi, &self.closed).await
	}

	async fn accept_uni(&self) -> Result<Box<dyn RecvStream>, TransportError> {
		accept(&self.uni, &self.closed).await
	}

	fn send_datagram(&self, payload: Bytes) -> Result<(), TransportError> {
		self.check()?;

		// Datagrams are unreliable; a missing peer just loses them.
		let _ = self.peer_datagram.send(payload);
		Ok(())
	}

	async fn recv_datagram(&self) -> Result<Bytes, TransportError> {
		accept(&self.datagram, &self.closed).await
	}

	fn close(&self, code: u32, reason: &str) {
		self.closed.send_if_modified(|closed| {
			if closed.is_some() {
				return false;
			}

			*closed = Some(TransportError::Closed {
				code,
				reason: reason.to_string(),
			});
			true
		});
	}

	async fn closed(&self) -> TransportError {
		wait_closed(&mut self.closed.subscribe()).await
	}
}

enum Chunk {
	Data(Bytes),
	Fin,
	Reset(u32),
}

pub struct MemorySend {
	chunks: Option<mpsc::UnboundedSender<Chunk>>,
	stopped: Arc<Mutex<Option<u32>>>,
	closed: watch::Receiver<Option<TransportError>>,
	priority: i32,
}

impl MemorySend {
	pub fn priority(&self) -> i32 {
		self.priority
	}
}

#[async_trait]
impl SendStream for MemorySend {
	async fn write(&mut self, buf: &[u8]) -> Result<usize, TransportError> {
		if let Some(err) = &*self.closed.borrow() {
			return Err(err.clone());
		}

		if let Some(code) = *self.stopped.lock().unwrap_or_else(|e| e.into_inner()) {
			return Err(TransportError::Stopped(code));
		}

		let chunks = self
			.chunks
			.as_ref()
			.ok_or_else(|| TransportError::Lost("stream already finished".to_string()))?;

		chunks
			.send(Chunk::Data(Bytes::copy_from_slice(buf)))
			.map_err(|_| TransportError::Stopped(0))?;

		Ok(buf.len())
	}

	fn set_priority(&mut self, priority: i32) {
		self.priority = priority;
	}

	fn finish(&mut self) -> Result<(), TransportError> {
		let chunks = self
			.chunks
			.take()
			.ok_or_else(|| TransportError::Lost("stream already finished".to_string()))?;

		let _ = chunks.send(Chunk::Fin);
		Ok(())
	}

	fn reset(&mut self, code: u32) {
		if let Some(chunks) = self.chunks.take() {
			let _ = chunks.send(Chunk::Reset(code));
		}
	}
}

impl Drop for MemorySend {
	fn drop(&mut self) {
		// Like QUIC, an unfinished stream is reset when dropped.
		self.reset(0);
	}
}

pub struct MemoryRecv {
	chunks: mpsc::UnboundedReceiver<Chunk>,
	pending: Bytes,
	done: bool,
	stopped: Arc<Mutex<Option<u32>>>,
	closed: watch::Receiver<Option<TransportError>>,
}

impl MemoryRecv {
	fn take(&mut self, max: usize) -> Bytes {
		let size = self.pending.len().min(max);
		self.pending.split_to(size)
	}
}

#[async_trait]
impl RecvStream for MemoryRecv {
	async fn read_chunk(&mut self, max: usize) -> Result<Option<Bytes>, TransportError> {
		if !self.pending.is_empty() {
			return Ok(Some(self.take(max)));
		}

		if self.done {
			return Ok(None);
		}

		loop {
			let chunk = tokio::select! {
				biased;
				err = wait_closed(&mut self.closed) => return Err(err),
				chunk = self.chunks.recv() => chunk,
			};

			match chunk {
				Some(Chunk::Data(data)) if data.is_empty() => continue,
				Some(Chunk::Data(data)) => {
					self.pending = data;
					return Ok(Some(self.take(max)));
				}
				Some(Chunk::Fin) => {
					self.done = true;
					return Ok(None);
				}
				Some(Chunk::Reset(code)) => return Err(TransportError::Reset(code)),
				None => return Err(TransportError::Reset(0)),
			}
		}
	}

	fn stop(&mut self, code: u32) {
		self.stopped.lock().unwrap_or_else(|e| e.into_inner()).get_or_insert(code);
		self.chunks.close();
	}
}
