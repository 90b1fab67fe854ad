use bytes::{Buf, BufMut};

use super::{Version, Versions};
use crate::coding::{Decode, DecodeError, Encode, Message, Parameters};

/// Sent by the client to start the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClient {
	pub versions: Versions,
	pub params: Parameters,
}

impl Message for SessionClient {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let versions = Versions::decode(r)?;
		let params = Parameters::decode(r)?;
		Ok(Self { versions, params })
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.versions.encode(w);
		self.params.encode(w);
	}
}

/// Sent by the server in response to [SessionClient].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionServer {
	pub version: Version,
	pub params: Parameters,
}

impl Message for SessionServer {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		let version = Version::decode(r)?;
		let params = Parameters::decode(r)?;
		Ok(Self { version, params })
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.version.encode(w);
		self.params.encode(w);
	}
}

/// An advisory estimate of the sender's available bitrate, in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionUpdate {
	pub bitrate: u64,
}

impl Message for SessionUpdate {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self {
			bitrate: u64::decode(r)?,
		})
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.bitrate.encode(w)
	}
}
