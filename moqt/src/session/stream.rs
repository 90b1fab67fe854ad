use crate::message::StreamType;
use crate::transport::Connection;
use crate::util::Close;
use crate::Error;

use super::{Reader, Writer};

// Both halves of a bidirectional stream.
pub(crate) struct Stream {
	pub writer: Writer,
	pub reader: Reader,
}

impl Stream {
	pub async fn open(conn: &dyn Connection, kind: StreamType) -> Result<Self, Error> {
		let (send, recv) = conn.open_bi().await?;

		let mut writer = Writer::new(send, kind);
		let reader = Reader::new(recv, kind);
		writer.encode_silent(&kind).await?;

		Ok(Self { writer, reader })
	}

	pub fn set_kind(&mut self, kind: StreamType) {
		self.writer.set_kind(kind);
		self.reader.set_kind(kind);
	}
}

impl Close for Stream {
	fn close(&mut self, err: &Error) {
		self.writer.close(err);
		self.reader.close(err);
	}
}
