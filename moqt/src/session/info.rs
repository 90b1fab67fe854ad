use crate::message;
use crate::util::Close;
use crate::{Error, Path};

use super::Stream;

/// A request from the peer for the latest information about a track.
pub struct InfoRequested {
	request: message::InfoRequest,
	stream: Stream,
}

impl InfoRequested {
	pub(super) fn new(request: message::InfoRequest, stream: Stream) -> Self {
		Self { request, stream }
	}

	pub fn path(&self) -> &Path {
		&self.request.path
	}

	/// Reply and finish the stream.
	pub async fn respond(mut self, info: message::Info) -> Result<(), Error> {
		self.stream.writer.encode(&info).await?;
		self.stream.writer.finish()
	}

	/// Reject the request, usually with [Error::NotFound].
	pub fn reject(mut self, err: Error) {
		self.stream.close(&err);
	}
}
