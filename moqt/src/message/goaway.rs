use bytes::{Buf, BufMut};

use crate::coding::{Decode, DecodeError, Encode, Message};

/// Sent by the server to ask the client to migrate to a new session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GoAway {
	pub uri: String,
}

impl Message for GoAway {
	fn decode_msg<R: Buf>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(Self { uri: String::decode(r)? })
	}

	fn encode_msg<W: BufMut>(&self, w: &mut W) {
		self.uri.encode(w)
	}
}
